#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::metrics::GatewayMetrics;
use api_gateway::proxy::{build_client, UpstreamTable};
use api_gateway::rate_limiter::{BucketConfig, RateLimiters};
use api_gateway::routes::RouteTable;
use api_gateway::{build_router, AppState};
use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::{Json, Router};
use common_audit::{AuditProducer, MemoryAuditSink};
use common_auth::{JwtConfig, Role, RoleSet, TokenCodec};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const SECRET: &str = "gateway-integration-secret-0123456789abcdef";

pub struct TestGateway {
    pub router: Router,
    pub codec: Arc<TokenCodec>,
    pub audit: MemoryAuditSink,
    pub metrics: Arc<GatewayMetrics>,
}

/// Upstream that answers every request with what it received.
async fn echo(request: Request) -> Json<Value> {
    let headers: BTreeMap<String, String> = request
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "headers": headers,
    }))
}

pub async fn spawn_echo_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo");
    let addr = listener.local_addr().expect("echo addr");
    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("echo server");
    });
    format!("http://{addr}")
}

impl TestGateway {
    pub async fn with_echo() -> Self {
        let upstream = spawn_echo_upstream().await;
        let routes = format!(
            "/auth={upstream},/admin={upstream},/movies={upstream},/static={upstream}"
        );
        Self::build(UpstreamTable::parse(&routes).expect("routes"))
    }

    pub fn with_routes(routes: &str) -> Self {
        Self::build(UpstreamTable::parse(routes).expect("routes"))
    }

    pub fn without_upstreams() -> Self {
        Self::build(UpstreamTable::default())
    }

    fn build(upstreams: UpstreamTable) -> Self {
        let config = JwtConfig::new(SECRET, "spring-microservices").expect("jwt config");
        let codec = Arc::new(TokenCodec::new(config));
        let audit = MemoryAuditSink::new();
        let metrics = Arc::new(GatewayMetrics::new().expect("metrics"));
        let state = AppState {
            codec: codec.clone(),
            public_routes: Arc::new(RouteTable::default_public()),
            upstreams: Arc::new(upstreams),
            rate_limiters: RateLimiters::in_process(
                BucketConfig::new(5, 10).expect("auth bucket"),
                BucketConfig::new(20, 50).expect("api bucket"),
                "/auth",
            ),
            metrics: metrics.clone(),
            audit: AuditProducer::new(audit.clone(), "api-gateway"),
            http_client: build_client(Duration::from_secs(5)).expect("client"),
        };
        Self {
            router: build_router(state),
            codec,
            audit,
            metrics,
        }
    }

    pub fn token(&self, subject: &str, role: Role) -> String {
        self.codec
            .encode_default(subject, &RoleSet::single(role))
            .expect("token")
            .into_string()
    }
}

pub fn request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn echoed_headers(body: &Value) -> &serde_json::Map<String, Value> {
    body["headers"].as_object().expect("headers object")
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
