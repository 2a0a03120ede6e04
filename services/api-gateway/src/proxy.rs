use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::app_state::AppState;

/// Request bodies above this size are refused rather than buffered.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpstreamParseError {
    #[error("upstream entry '{0}' must look like /prefix=http://host:port")]
    Malformed(String),
    #[error("upstream url '{0}' must use http or https")]
    Scheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub prefix: String,
    pub base_url: String,
}

impl Upstream {
    fn matches(&self, path: &str) -> bool {
        let base = self.prefix.trim_end_matches('/');
        if base.is_empty() {
            return true;
        }
        match path.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Path prefix to upstream base URL mapping. The longest matching prefix
/// wins; the path is forwarded unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpstreamTable {
    upstreams: Vec<Upstream>,
}

impl UpstreamTable {
    pub fn parse(list: &str) -> Result<Self, UpstreamParseError> {
        let mut upstreams = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (prefix, url) = entry
                .split_once('=')
                .ok_or_else(|| UpstreamParseError::Malformed(entry.to_string()))?;
            let prefix = prefix.trim();
            let url = url.trim().trim_end_matches('/');
            if !prefix.starts_with('/') || url.is_empty() {
                return Err(UpstreamParseError::Malformed(entry.to_string()));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(UpstreamParseError::Scheme(url.to_string()));
            }
            upstreams.push(Upstream {
                prefix: prefix.to_string(),
                base_url: url.to_string(),
            });
        }
        upstreams.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { upstreams })
    }

    pub fn resolve(&self, path: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}

pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Fallback handler: relays whatever the filter let through to its upstream.
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let Some(upstream) = state.upstreams.resolve(&path) else {
        debug!(path = %path, "no upstream route");
        return ApiError::NotFound { code: "NO_ROUTE" }.into_response();
    };

    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = upstream.target(path_and_query);

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, path = %path, "failed to read request body");
            return ApiError::bad_request("BODY_TOO_LARGE", "Request body could not be read")
                .into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let outcome = state
        .http_client
        .request(parts.method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream_response = match outcome {
        Ok(resp) => resp,
        Err(err) if err.is_timeout() => {
            warn!(upstream = %upstream.base_url, path = %path, "upstream timed out");
            return ApiError::GatewayTimeout.into_response();
        }
        Err(err) => {
            warn!(
                error = %err,
                upstream = %upstream.base_url,
                path = %path,
                "upstream request failed"
            );
            return ApiError::BadGateway {
                message: "Upstream service unavailable".to_string(),
            }
            .into_response();
        }
    };

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    response_headers.remove(header::CONTENT_LENGTH);

    let bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) if err.is_timeout() => return ApiError::GatewayTimeout.into_response(),
        Err(err) => {
            warn!(error = %err, upstream = %upstream.base_url, "failed to read upstream body");
            return ApiError::BadGateway {
                message: "Upstream response was incomplete".to_string(),
            }
            .into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
