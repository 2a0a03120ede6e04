use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue};

use crate::codec::TokenCodec;
use crate::error::{AuthError, Result};
use crate::roles::{Role, RoleSet};

/// Identity proven by a bearer token that decoded `Valid` against the shared
/// codec.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub roles: RoleSet,
    pub token: String,
}

impl AuthContext {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<TokenCodec>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let codec = Arc::<TokenCodec>::from_ref(state);
        let token = bearer_from_headers(&parts.headers)?;
        let (subject, roles) = codec.decode(&token).into_identity()?;
        Ok(Self {
            subject,
            roles,
            token,
        })
    }
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Result<String> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::TokenMissing)?;
    parse_bearer(value)
}

pub fn parse_bearer(value: &HeaderValue) -> Result<String> {
    let raw = value.to_str().map_err(|_| AuthError::TokenMissing)?.trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::TokenMissing)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::TokenMissing);
    }

    Ok(token.to_owned())
}
