use anyhow::Result;
use axum::response::Response;
use common_observability::render_registry;
use prometheus::{IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    rate_rejections: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new(
                "gateway_requests_total",
                "Requests seen by the gateway filter grouped by classification and outcome",
            ),
            &["classification", "outcome"],
        )?;
        let rate_rejections = IntCounterVec::new(
            Opts::new(
                "gateway_rate_limit_rejections_total",
                "Requests rejected by a rate limit bucket",
            ),
            &["bucket"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(rate_rejections.clone()))?;
        Ok(Self {
            registry,
            requests,
            rate_rejections,
        })
    }

    pub fn record_request(&self, classification: &str, outcome: &str) {
        self.requests
            .with_label_values(&[classification, outcome])
            .inc();
    }

    pub fn record_rate_rejection(&self, bucket: &str) {
        self.rate_rejections.with_label_values(&[bucket]).inc();
    }

    pub fn request_count(&self, classification: &str, outcome: &str) -> u64 {
        self.requests
            .with_label_values(&[classification, outcome])
            .get()
    }

    pub fn render(&self) -> Result<Response> {
        render_registry(&self.registry)
    }
}
