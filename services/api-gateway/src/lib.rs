pub mod app_state;
pub mod client_ip;
pub mod config;
pub mod filter;
pub mod metrics;
pub mod proxy;
pub mod rate_limiter;
pub mod routes;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{middleware, Router};
use common_auth::{ensure_role, AuthContext, Role};
use common_http_errors::{http_error_metrics_layer, ApiError};
use tower_http::trace::TraceLayer;

pub use app_state::AppState;

pub const SERVICE_NAME: &str = "api-gateway";

async fn health() -> &'static str {
    "ok"
}

async fn metrics(auth: AuthContext, State(state): State<AppState>) -> Result<Response, ApiError> {
    ensure_role(&auth, &[Role::Admin])?;
    state.metrics.render().map_err(ApiError::internal)
}

/// Local `/health` and `/metrics`, everything else proxied. Every request,
/// local or proxied, passes through [`filter::gateway_filter`] first.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(proxy::forward)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            filter::gateway_filter,
        ))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
        .layer(TraceLayer::new_for_http())
}
