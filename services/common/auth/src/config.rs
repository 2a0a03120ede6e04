use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{AuthError, Result};

/// Issuer used by the legacy token producers; kept as the default for interop.
pub const DEFAULT_ISSUER: &str = "spring-microservices";
pub const DEFAULT_TTL_MS: u64 = 86_400_000;
/// HMAC-SHA256 keys shorter than the hash output are rejected.
pub const MIN_SECRET_BYTES: usize = 32;

/// Immutable signing/verification settings shared by every token producer and
/// consumer in a deployment.
///
/// Construction validates the secret, so a `JwtConfig` value that exists is
/// always usable. Missing or weak secrets surface as
/// [`AuthError::Configuration`] and must abort process startup.
#[derive(Clone)]
pub struct JwtConfig {
    secret: Vec<u8>,
    /// Expected and emitted issuer claim (iss).
    pub issuer: String,
    /// Lifetime of freshly minted tokens.
    pub ttl: Duration,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    pub fn new(secret: impl AsRef<[u8]>, issuer: impl Into<String>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(AuthError::Configuration(
                "JWT secret not configured. Set the JWT_SECRET environment variable.".into(),
            ));
        }
        if secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError::Configuration(format!(
                "JWT secret must be at least {MIN_SECRET_BYTES} bytes for HS256"
            )));
        }

        let issuer = issuer.into();
        if issuer.trim().is_empty() {
            return Err(AuthError::Configuration("JWT issuer must not be empty".into()));
        }

        Ok(Self {
            secret: secret.to_vec(),
            issuer,
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            leeway_seconds: 0,
        })
    }

    /// Adjust the default token lifetime. Lifetimes under one second cannot be
    /// represented in the `exp` claim and are rejected.
    pub fn with_ttl(mut self, ttl: Duration) -> Result<Self> {
        if ttl.as_secs() == 0 {
            return Err(AuthError::Configuration(
                "token TTL must be at least one second".into(),
            ));
        }
        self.ttl = ttl;
        Ok(self)
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Load from `JWT_SECRET`, `JWT_ISSUER`, `JWT_EXPIRATION_MS` and
    /// `JWT_LEEWAY_SECONDS`.
    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").unwrap_or_default();
        let issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());

        let ttl_ms = match env::var("JWT_EXPIRATION_MS") {
            Ok(value) => value.trim().parse::<u64>().map_err(|_| {
                AuthError::Configuration(format!("JWT_EXPIRATION_MS is not a number: '{value}'"))
            })?,
            Err(_) => DEFAULT_TTL_MS,
        };
        let leeway = env::var("JWT_LEEWAY_SECONDS")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(0);

        Self::new(secret, issuer)?
            .with_ttl(Duration::from_millis(ttl_ms))
            .map(|config| config.with_leeway(leeway))
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn ttl_seconds(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let err = JwtConfig::new("   ", "issuer").expect_err("blank secret");
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = JwtConfig::new("too-short", "issuer").expect_err("weak secret");
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let config = JwtConfig::new(SECRET, "issuer").expect("config");
        let err = config
            .with_ttl(Duration::from_millis(500))
            .expect_err("sub-second ttl");
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = JwtConfig::new(SECRET, "issuer").expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn defaults_match_legacy_producer() {
        let config = JwtConfig::new(SECRET, DEFAULT_ISSUER).expect("config");
        assert_eq!(config.ttl_seconds(), 86_400);
        assert_eq!(config.leeway_seconds, 0);
    }
}
