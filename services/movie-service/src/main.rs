use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use common_audit::AuditProducer;
use common_observability::init_tracing;
use movie_service::catalog::MovieCatalog;
use movie_service::{build_router, AppState, SERVICE_NAME};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = AppState {
        catalog: Arc::new(MovieCatalog::with_samples().await),
        audit: AuditProducer::tracing(SERVICE_NAME),
    };
    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8082);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting movie-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
