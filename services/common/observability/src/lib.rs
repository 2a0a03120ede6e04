use std::env;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` drives filtering (default
/// `info`); `LOG_FORMAT=json` switches to one JSON object per line.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let _ = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
}

/// Prometheus text exposition of `registry` followed by the process-wide
/// default registry.
pub fn render_registry(registry: &Registry) -> Result<Response> {
    let encoder = TextEncoder::new();
    let mut metric_families = registry.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )
        .body(Body::from(buffer))?;
    Ok(response)
}
