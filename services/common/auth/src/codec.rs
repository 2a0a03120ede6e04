use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::debug;

use crate::claims::{AuthResult, Token, TokenClaims};
use crate::clock::{Clock, SystemClock};
use crate::config::JwtConfig;
use crate::error::{AuthError, Result};
use crate::roles::RoleSet;

/// Encodes and decodes HS256-signed claim sets. Pure apart from reading the
/// clock; safe to share across threads without synchronisation.
#[derive(Clone)]
pub struct TokenCodec {
    config: Arc<JwtConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret());
        let decoding_key = DecodingKey::from_secret(config.secret());
        Self {
            config: Arc::new(config),
            encoding_key,
            decoding_key,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Mint a token with the configured default lifetime.
    pub fn encode_default(&self, subject: &str, roles: &RoleSet) -> Result<Token> {
        self.encode(subject, roles, self.config.ttl)
    }

    pub fn encode(&self, subject: &str, roles: &RoleSet, ttl: Duration) -> Result<Token> {
        if subject.trim().is_empty() {
            return Err(AuthError::InvalidClaim("sub", subject.to_string()));
        }
        let ttl_secs = i64::try_from(ttl.as_secs())
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| AuthError::InvalidClaim("exp", format!("{ttl:?}")))?;

        let issued_at = self.clock.now().timestamp();
        let expires_at = issued_at
            .checked_add(ttl_secs)
            .ok_or_else(|| AuthError::InvalidClaim("exp", format!("{ttl:?}")))?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            roles: roles.to_claim(),
            iss: self.config.issuer.clone(),
            iat: issued_at,
            exp: expires_at,
        };

        let compact = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Token::from_claims(compact, &claims)
    }

    /// Decode at the clock's current time.
    pub fn decode(&self, token: &str) -> AuthResult {
        self.decode_at(token, self.clock.now())
    }

    /// Checks run in a fixed order and short-circuit: structure, signature,
    /// issuer, expiry.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult {
        match self.verify_claims(token, now) {
            Ok(claims) => AuthResult::Valid {
                roles: RoleSet::from_claim(&claims.roles),
                subject: claims.sub,
            },
            Err(rejected) => rejected,
        }
    }

    /// Like [`TokenCodec::decode`] but hands back the full token on success.
    pub fn verify(&self, token: &str) -> Result<Token> {
        let token = token.trim();
        match self.verify_claims(token, self.clock.now()) {
            Ok(claims) => Token::from_claims(token.to_string(), &claims),
            Err(rejected) => Err(rejected
                .into_identity()
                .err()
                .unwrap_or(AuthError::TokenMalformed)),
        }
    }

    fn verify_claims(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<TokenClaims, AuthResult> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthResult::Missing);
        }

        if token.split('.').count() != 3 {
            debug!("token rejected: not a three-segment JWS");
            return Err(AuthResult::MalformedSignature);
        }
        if let Err(err) = decode_header(token) {
            debug!(error = %err, "token rejected: unreadable header");
            return Err(AuthResult::MalformedSignature);
        }

        let decoded = decode::<TokenClaims>(token, &self.decoding_key, &self.signature_only());
        let claims = match decoded {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(error = %err, "token rejected: signature or payload invalid");
                return Err(AuthResult::MalformedSignature);
            }
        };
        if claims.sub.trim().is_empty() {
            return Err(AuthResult::MalformedSignature);
        }

        if claims.iss != self.config.issuer {
            debug!(issuer = %claims.iss, "token rejected: issuer mismatch");
            return Err(AuthResult::WrongIssuer);
        }

        let Some(expires_at) = Utc.timestamp_opt(claims.exp, 0).single() else {
            return Err(AuthResult::MalformedSignature);
        };
        let leeway = ChronoDuration::seconds(i64::from(self.config.leeway_seconds));
        // A deadline past the representable range never arrives.
        if let Some(deadline) = expires_at.checked_add_signed(leeway) {
            if now >= deadline {
                debug!(subject = %claims.sub, "token rejected: expired");
                return Err(AuthResult::Expired);
            }
        }

        Ok(claims)
    }

    // Issuer and expiry are checked by hand so their precedence is explicit.
    fn signature_only(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }
}
