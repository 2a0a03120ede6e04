use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::roles::RoleSet;

/// Signed payload as it appears on the wire. `roles` stays a delimited string
/// so tokens interoperate with the other producers and consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A minted, signed token. Immutable once created.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    compact: String,
    subject: String,
    issuer: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    roles: RoleSet,
}

impl Token {
    pub(crate) fn from_claims(compact: String, claims: &TokenClaims) -> Result<Self> {
        let issued_at = timestamp("iat", claims.iat)?;
        let expires_at = timestamp("exp", claims.exp)?;
        Ok(Self {
            compact,
            subject: claims.sub.clone(),
            issuer: claims.iss.clone(),
            issued_at,
            expires_at,
            roles: RoleSet::from_claim(&claims.roles),
        })
    }

    /// Compact `header.payload.signature` form for the Authorization header.
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    pub fn into_string(self) -> String {
        self.compact
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn roles_claim(&self) -> String {
        self.roles.to_claim()
    }

    pub fn signature(&self) -> &str {
        self.compact.rsplit('.').next().unwrap_or_default()
    }

    /// Whole seconds of validity left at `now`, floored at zero.
    pub fn expires_in_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[PROTECTED]")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("roles", &self.roles.to_claim())
            .finish()
    }
}

/// Outcome of decoding a presented token. No claims are exposed unless every
/// check passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Valid { subject: String, roles: RoleSet },
    Expired,
    MalformedSignature,
    WrongIssuer,
    Missing,
}

impl AuthResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, AuthResult::Valid { .. })
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthResult::Valid { .. } => "valid",
            AuthResult::Expired => "expired",
            AuthResult::MalformedSignature => "malformed_signature",
            AuthResult::WrongIssuer => "wrong_issuer",
            AuthResult::Missing => "missing",
        }
    }

    pub fn into_identity(self) -> Result<(String, RoleSet)> {
        match self {
            AuthResult::Valid { subject, roles } => Ok((subject, roles)),
            AuthResult::Expired => Err(AuthError::TokenExpired),
            AuthResult::MalformedSignature => Err(AuthError::TokenMalformed),
            AuthResult::WrongIssuer => Err(AuthError::TokenWrongIssuer),
            AuthResult::Missing => Err(AuthError::TokenMissing),
        }
    }
}

fn timestamp(claim: &'static str, value: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::InvalidClaim(claim, value.to_string()))
}
