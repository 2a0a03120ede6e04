use std::sync::Arc;

use anyhow::Context;
use auth_service::config::load_auth_config;
use auth_service::metrics::AuthMetrics;
use auth_service::store::{seed_demo_users, InMemoryUserStore, UserStore};
use auth_service::{build_router, AppState};
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

    let config = load_auth_config()?;
    if config.degraded_mode.is_enabled() {
        warn!(
            "degraded mode enabled: built-in demo principals accepted while the user store is down"
        );
    }

    let store = Arc::new(InMemoryUserStore::new());
    if config.seed_demo_users {
        let created = seed_demo_users(&*store)
            .await
            .context("Failed to seed demo users")?;
        info!(created, "demo users seeded");
    }
    let store: Arc<dyn UserStore> = store;

    let codec = Arc::new(TokenCodec::new(config.jwt.clone()));
    let state = AppState::new(
        codec,
        store,
        config.degraded_mode,
        config.store_timeout,
        Arc::new(AuthMetrics::new()?),
        AuditProducer::tracing("auth-service"),
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    let app = build_router(state).layer(cors);

    let addr = config.socket_addr();
    info!(%addr, issuer = %config.jwt.issuer, "starting auth-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
