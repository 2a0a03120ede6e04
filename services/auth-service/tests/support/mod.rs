#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use auth_service::credentials::DegradedMode;
use auth_service::metrics::AuthMetrics;
use auth_service::store::{seed_demo_users, InMemoryUserStore, UserStore};
use auth_service::{build_router, AppState};
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request};
use axum::response::Response;
use axum::Router;
use chrono::{TimeZone, Utc};
use common_audit::{AuditProducer, MemoryAuditSink};
use common_auth::{FixedClock, JwtConfig, Role, RoleSet, TokenCodec};
use http_body_util::BodyExt;
use serde_json::{json, Value};

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const ISSUER: &str = "spring-microservices";

pub struct TestApp {
    pub router: Router,
    pub codec: Arc<TokenCodec>,
    pub clock: FixedClock,
    pub audit: MemoryAuditSink,
}

impl TestApp {
    pub async fn seeded() -> Self {
        let store = Arc::new(InMemoryUserStore::new());
        seed_demo_users(&*store).await.expect("seed");
        Self::with_store(store, DegradedMode::Disabled)
    }

    pub fn with_store(store: Arc<dyn UserStore>, degraded: DegradedMode) -> Self {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).single().expect("time");
        let clock = FixedClock::new(start);
        let config = JwtConfig::new(SECRET, ISSUER)
            .expect("jwt config")
            .with_ttl(Duration::from_secs(900))
            .expect("ttl");
        let codec = Arc::new(TokenCodec::new(config).with_clock(Arc::new(clock.clone())));
        let audit = MemoryAuditSink::new();
        let state = AppState::new(
            codec.clone(),
            store,
            degraded,
            Duration::from_millis(500),
            Arc::new(AuthMetrics::new().expect("metrics")),
            AuditProducer::new(audit.clone(), "auth-service"),
        );
        Self {
            router: build_router(state),
            codec,
            clock,
            audit,
        }
    }

    pub fn token(&self, subject: &str, role: Role) -> String {
        self.codec
            .encode_default(subject, &RoleSet::single(role))
            .expect("token")
            .into_string()
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn json_request_as(method: &str, uri: &str, body: Value, bearer: &str) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {bearer}").parse().expect("header"),
    );
    request
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    json_request(
        "POST",
        "/auth/login",
        json!({"username": username, "password": password}),
    )
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
