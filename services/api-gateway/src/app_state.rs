use std::sync::Arc;

use axum::extract::FromRef;
use common_audit::AuditProducer;
use common_auth::TokenCodec;
use reqwest::Client;

use crate::metrics::GatewayMetrics;
use crate::proxy::UpstreamTable;
use crate::rate_limiter::RateLimiters;
use crate::routes::RouteTable;

#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub public_routes: Arc<RouteTable>,
    pub upstreams: Arc<UpstreamTable>,
    pub rate_limiters: RateLimiters,
    pub metrics: Arc<GatewayMetrics>,
    pub audit: AuditProducer,
    pub http_client: Client,
}

impl AppState {
    pub fn record_request(&self, classification: &str, outcome: &str) {
        self.metrics.record_request(classification, outcome);
    }
}

impl FromRef<AppState> for Arc<TokenCodec> {
    fn from_ref(state: &AppState) -> Self {
        state.codec.clone()
    }
}
