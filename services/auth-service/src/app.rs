use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use common_audit::AuditProducer;
use common_auth::TokenCodec;
use common_http_errors::http_error_metrics_layer;
use tower_http::trace::TraceLayer;

use crate::credentials::{CredentialValidator, DegradedMode};
use crate::handlers::{
    check_email, check_username, current_user, health, login, metrics, refresh, register,
    validate,
};
use crate::metrics::AuthMetrics;
use crate::store::UserStore;
use crate::tokens::TokenService;

pub const SERVICE_NAME: &str = "auth-service";

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenService,
    pub codec: Arc<TokenCodec>,
    pub store: Arc<dyn UserStore>,
    pub store_timeout: Duration,
    pub metrics: Arc<AuthMetrics>,
    pub audit: AuditProducer,
}

impl AppState {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn UserStore>,
        degraded: DegradedMode,
        store_timeout: Duration,
        metrics: Arc<AuthMetrics>,
        audit: AuditProducer,
    ) -> Self {
        let validator = CredentialValidator::new(store.clone(), degraded, store_timeout);
        Self {
            tokens: TokenService::new(codec.clone(), validator),
            codec,
            store,
            store_timeout,
            metrics,
            audit,
        }
    }

    pub fn record_login_metric(&self, outcome: &str) {
        self.metrics.login_attempt(outcome);
    }

    pub fn record_token_metric(&self, op: &str, outcome: &str) {
        self.metrics.token_operation(op, outcome);
    }
}

impl FromRef<AppState> for Arc<TokenCodec> {
    fn from_ref(state: &AppState) -> Self {
        state.codec.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/login", post(login))
        .route("/auth/validate", post(validate))
        .route("/auth/refresh", post(refresh))
        .route("/auth/register", post(register))
        .route("/auth/me", get(current_user))
        .route("/auth/check-username/:username", get(check_username))
        .route("/auth/check-email/:email", get(check_email))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
        .layer(TraceLayer::new_for_http())
}
