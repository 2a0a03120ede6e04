use anyhow::{bail, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use common_auth::JwtConfig;

use crate::credentials::DegradedMode;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: IpAddr,
    pub port: u16,
    pub jwt: JwtConfig,
    pub environment: String,
    pub degraded_mode: DegradedMode,
    pub store_timeout: Duration,
    pub seed_demo_users: bool,
}

impl AuthConfig {
    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

pub fn load_auth_config() -> Result<AuthConfig> {
    let jwt = JwtConfig::from_env().context("Failed to load JWT configuration")?;

    let host = env::var("HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("HOST must be an IP address")?;
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let degraded = bool_from_env("AUTH_DEGRADED_MODE").unwrap_or(false);
    let degraded_mode = resolve_degraded_mode(degraded, &environment)?;

    let store_timeout = env::var("AUTH_STORE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));

    let seed_demo_users =
        bool_from_env("AUTH_SEED_DEMO_USERS").unwrap_or(!is_production(&environment));

    Ok(AuthConfig {
        host,
        port,
        jwt,
        environment,
        degraded_mode,
        store_timeout,
        seed_demo_users,
    })
}

/// Degraded mode bypasses the user store, so production refuses to start
/// with it switched on.
pub fn resolve_degraded_mode(requested: bool, environment: &str) -> Result<DegradedMode> {
    if !requested {
        return Ok(DegradedMode::Disabled);
    }
    if is_production(environment) {
        bail!("AUTH_DEGRADED_MODE cannot be enabled when APP_ENV={environment}");
    }
    Ok(DegradedMode::BuiltInPrincipals)
}

fn is_production(environment: &str) -> bool {
    matches!(
        environment.trim().to_ascii_lowercase().as_str(),
        "prod" | "production"
    )
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
