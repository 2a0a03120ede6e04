pub mod catalog;
pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use common_audit::AuditProducer;
use common_http_errors::http_error_metrics_layer;
use tower_http::trace::TraceLayer;

use crate::catalog::MovieCatalog;
use crate::handlers::{create_movie, health, list_movies};

pub const SERVICE_NAME: &str = "movie-service";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<MovieCatalog>,
    pub audit: AuditProducer,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/movies", get(list_movies).post(create_movie))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
        .layer(TraceLayer::new_for_http())
}
