use anyhow::Result;
use axum::response::Response;
use common_observability::render_registry;
use prometheus::{IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    token_operations: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let token_operations = IntCounterVec::new(
            Opts::new(
                "auth_token_operations_total",
                "Token validate/refresh calls grouped by operation and outcome",
            ),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(token_operations.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            token_operations,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn token_operation(&self, op: &str, outcome: &str) {
        self.token_operations.with_label_values(&[op, outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        render_registry(&self.registry)
    }
}
