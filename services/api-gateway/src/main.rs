use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use api_gateway::config::GatewayConfig;
use api_gateway::metrics::GatewayMetrics;
use api_gateway::proxy::build_client;
use api_gateway::rate_limiter::RateLimiters;
use api_gateway::{build_router, AppState};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use common_audit::AuditProducer;
use common_auth::TokenCodec;
use common_observability::init_tracing;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GatewayConfig::from_env()?;
    if config.upstreams.is_empty() {
        warn!("GATEWAY_ROUTES is empty; every proxied request will return 404");
    }

    let rate_limiters = match &config.redis_url {
        Some(url) => {
            info!("using Redis-backed rate limiter");
            RateLimiters::redis(
                url,
                &config.redis_prefix,
                config.auth_bucket,
                config.api_bucket,
                config.auth_path_prefix.clone(),
            )
            .await
            .context("failed to connect rate limiter to Redis")?
        }
        None => {
            info!("using in-process rate limiter");
            let limiters = RateLimiters::in_process(
                config.auth_bucket,
                config.api_bucket,
                config.auth_path_prefix.clone(),
            );
            limiters.spawn_pruning(config.rate_limit_prune_interval);
            limiters
        }
    };

    let state = AppState {
        codec: Arc::new(TokenCodec::new(config.jwt.clone())),
        public_routes: Arc::new(config.public_routes.clone()),
        upstreams: Arc::new(config.upstreams.clone()),
        rate_limiters,
        metrics: Arc::new(GatewayMetrics::new()?),
        audit: AuditProducer::tracing(api_gateway::SERVICE_NAME),
        http_client: build_client(config.upstream_timeout)?,
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ]))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE]);

    let app = build_router(state).layer(cors);

    let addr = config.socket_addr()?;
    info!(%addr, public_rules = config.public_routes.rules().len(), "starting api-gateway");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
