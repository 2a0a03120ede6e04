use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use common_auth::JwtConfig;

use crate::proxy::UpstreamTable;
use crate::rate_limiter::BucketConfig;
use crate::routes::RouteTable;

const DEFAULT_ROUTES: &str = "/auth=http://localhost:8081,/movies=http://localhost:8082";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub upstreams: UpstreamTable,
    pub public_routes: RouteTable,
    pub auth_bucket: BucketConfig,
    pub api_bucket: BucketConfig,
    pub auth_path_prefix: String,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub upstream_timeout: Duration,
    pub rate_limit_prune_interval: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);
        let jwt = JwtConfig::from_env().context("JWT configuration is invalid")?;

        let routes = env::var("GATEWAY_ROUTES").unwrap_or_else(|_| DEFAULT_ROUTES.to_string());
        let upstreams = UpstreamTable::parse(&routes).context("GATEWAY_ROUTES is invalid")?;
        let public_routes = match env::var("GATEWAY_PUBLIC_ROUTES") {
            Ok(list) => RouteTable::parse(&list).context("GATEWAY_PUBLIC_ROUTES is invalid")?,
            Err(_) => RouteTable::default_public(),
        };

        let auth_bucket = BucketConfig::new(
            u32_from_env("GATEWAY_AUTH_RATE_REPLENISH", 5),
            u32_from_env("GATEWAY_AUTH_RATE_BURST", 10),
        )
        .context("auth rate limit bucket is invalid")?;
        let api_bucket = BucketConfig::new(
            u32_from_env("GATEWAY_API_RATE_REPLENISH", 20),
            u32_from_env("GATEWAY_API_RATE_BURST", 50),
        )
        .context("api rate limit bucket is invalid")?;

        let auth_path_prefix =
            env::var("GATEWAY_AUTH_PATH_PREFIX").unwrap_or_else(|_| "/auth".to_string());
        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());
        let redis_prefix = env::var("GATEWAY_RATE_LIMIT_PREFIX")
            .unwrap_or_else(|_| "api-gateway:rate".to_string());
        let upstream_timeout = Duration::from_millis(
            env::var("GATEWAY_UPSTREAM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10_000)
                .max(1),
        );
        let rate_limit_prune_interval = Duration::from_secs(
            env::var("GATEWAY_RATE_LIMIT_PRUNE_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60)
                .max(1),
        );

        Ok(Self {
            host,
            port,
            jwt,
            upstreams,
            public_routes,
            auth_bucket,
            api_bucket,
            auth_path_prefix,
            redis_url,
            redis_prefix,
            upstream_timeout,
            rate_limit_prune_interval,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("HOST '{}' is not an IP address", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

fn u32_from_env(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
