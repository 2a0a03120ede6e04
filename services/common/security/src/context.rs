use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use common_audit::{extract_actor_from_headers, AuditActor};
use common_auth::RoleSet;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::SecurityError;
use crate::headers::{X_AUTH_VALID, X_GATEWAY_VALIDATED, X_USER_ROLES, X_USER_USERNAME};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub username: String,
    pub roles: RoleSet,
    pub actor: AuditActor,
}

impl SecurityContext {
    /// Reads the gateway-injected identity. Both markers must be `true` and the
    /// username non-empty; roles are parsed leniently.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SecurityError> {
        if !flag(headers, X_GATEWAY_VALIDATED) || !flag(headers, X_AUTH_VALID) {
            return Err(SecurityError::NotGatewayValidated);
        }
        let username = header_str(headers, X_USER_USERNAME).ok_or(SecurityError::MissingIdentity)?;
        let roles = header_str(headers, X_USER_ROLES)
            .map(|csv| RoleSet::from_claim(&csv))
            .unwrap_or_default();
        Ok(Self {
            username,
            roles,
            actor: extract_actor_from_headers(headers),
        })
    }
}

/// Extractor for handlers behind the gateway.
pub struct GatewayIdentity(pub SecurityContext);

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn flag(headers: &HeaderMap, name: &str) -> bool {
    header_str(headers, name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[async_trait]
impl<S> FromRequestParts<S> for GatewayIdentity
where
    S: Send + Sync,
{
    type Rejection = SecurityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = SecurityContext::from_headers(&parts.headers)?;
        Span::current().record("username", tracing::field::display(&ctx.username));
        Ok(GatewayIdentity(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::Role;

    fn validated(username: &str, roles: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_GATEWAY_VALIDATED, "true".parse().unwrap());
        headers.insert(X_AUTH_VALID, "true".parse().unwrap());
        headers.insert(X_USER_USERNAME, username.parse().unwrap());
        headers.insert(X_USER_ROLES, roles.parse().unwrap());
        headers
    }

    #[test]
    fn reads_identity_from_trusted_headers() {
        let ctx = SecurityContext::from_headers(&validated("admin", "ADMIN,user")).unwrap();
        assert_eq!(ctx.username, "admin");
        assert!(ctx.roles.contains(Role::Admin));
        assert!(ctx.roles.contains(Role::User));
        assert_eq!(ctx.actor.username.as_deref(), Some("admin"));
    }

    #[test]
    fn missing_gateway_marker_is_rejected() {
        let mut headers = validated("admin", "ADMIN");
        headers.remove(X_GATEWAY_VALIDATED);
        assert!(matches!(
            SecurityContext::from_headers(&headers),
            Err(SecurityError::NotGatewayValidated)
        ));
    }

    #[test]
    fn false_auth_marker_is_rejected() {
        let mut headers = validated("admin", "ADMIN");
        headers.insert(X_AUTH_VALID, "false".parse().unwrap());
        assert!(SecurityContext::from_headers(&headers).is_err());
    }

    #[test]
    fn blank_username_is_rejected() {
        let headers = validated(" ", "ADMIN");
        assert!(matches!(
            SecurityContext::from_headers(&headers),
            Err(SecurityError::MissingIdentity)
        ));
    }

    #[test]
    fn unknown_roles_are_dropped() {
        let ctx = SecurityContext::from_headers(&validated("bob", "ROOT,moderator")).unwrap();
        assert_eq!(ctx.roles.to_vec(), vec![Role::Moderator]);
    }
}
