//! Per-request authentication filter. Runs once, in order:
//! strip spoofed identity headers, classify, authenticate protected
//! requests, apply the rate limit bucket, then hand over to the router.
//! Anonymous callers are rate limited by socket peer, not by forwarding
//! headers.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_audit::{AuditActor, SecurityEventKind};
use common_auth::{bearer_from_headers, AuthResult, RoleSet};
use common_http_errors::ApiError;
use common_security::{
    TRUSTED_IDENTITY_HEADERS, X_AUTH_VALID, X_CLIENT_IP, X_GATEWAY_VALIDATED, X_USER_ROLES,
    X_USER_USERNAME,
};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::client_ip::{peer_ip, resolve_client_ip};
use crate::rate_limiter::rate_limit_key;
use crate::routes::Classification;

pub const X_AUTH_STATUS: &str = "x-auth-status";
pub const MISSING_TOKEN_MESSAGE: &str = "Missing or invalid Authorization header";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired JWT token";

/// Verified principal attached to the request for local handlers.
#[derive(Debug, Clone)]
pub struct GatewayPrincipal {
    pub username: String,
    pub roles: RoleSet,
}

pub fn strip_identity_headers(headers: &mut HeaderMap) -> usize {
    TRUSTED_IDENTITY_HEADERS
        .iter()
        .map(|name| headers.remove(*name).is_some() as usize)
        .sum()
}

fn unauthorized(code: &'static str, message: &str) -> Response {
    let mut response = ApiError::Unauthorized {
        code,
        message: message.to_string(),
    }
    .into_response();
    response
        .headers_mut()
        .insert(X_AUTH_STATUS, HeaderValue::from_static("FAILED"));
    response
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => warn!(header = name, "dropping identity header with invalid characters"),
    }
}

fn inject_identity(headers: &mut HeaderMap, username: &str, roles: &RoleSet, client_ip: &str) {
    insert_header(headers, X_USER_USERNAME, username);
    insert_header(headers, X_USER_ROLES, &roles.to_claim());
    headers.insert(X_AUTH_VALID, HeaderValue::from_static("true"));
    headers.insert(X_GATEWAY_VALIDATED, HeaderValue::from_static("true"));
    insert_header(headers, X_CLIENT_IP, client_ip);
}

pub async fn gateway_filter(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let spoofed = strip_identity_headers(request.headers_mut());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = resolve_client_ip(&request);
    let peer = peer_ip(&request);
    if spoofed > 0 {
        warn!(
            method = %method,
            path = %path,
            client_ip = %client_ip,
            spoofed,
            "stripped client-supplied identity headers"
        );
    }
    info!(method = %method, path = %path, client_ip = %client_ip, "gateway request");

    let classification = state.public_routes.classify(&method, &path);
    let class_label = classification.as_str();
    let mut actor = AuditActor {
        client_ip: Some(client_ip.clone()),
        ..Default::default()
    };

    let principal = match classification {
        Classification::Public => None,
        Classification::Protected => {
            let token = match bearer_from_headers(request.headers()) {
                Ok(token) => token,
                Err(_) => {
                    state.record_request(class_label, "missing_token");
                    state
                        .audit
                        .record(
                            SecurityEventKind::AuthFailure,
                            actor,
                            Some(method.as_str()),
                            Some(&path),
                            Some("missing_token"),
                        )
                        .await;
                    return unauthorized("TOKEN_MISSING", MISSING_TOKEN_MESSAGE);
                }
            };
            match state.codec.decode(&token) {
                AuthResult::Valid { subject, roles } => Some(GatewayPrincipal {
                    username: subject,
                    roles,
                }),
                rejected => {
                    state.record_request(class_label, rejected.reason());
                    state
                        .audit
                        .record(
                            SecurityEventKind::AuthFailure,
                            actor,
                            Some(method.as_str()),
                            Some(&path),
                            Some(rejected.reason()),
                        )
                        .await;
                    return unauthorized("INVALID_TOKEN", INVALID_TOKEN_MESSAGE);
                }
            }
        }
    };

    if let Some(principal) = &principal {
        actor.username = Some(principal.username.clone());
        actor.roles = Some(principal.roles.to_claim());
    }

    let key = rate_limit_key(principal.as_ref().map(|p| p.username.as_str()), &peer);
    let (bucket, decision) = state.rate_limiters.check(&path, &key).await;
    if !decision.allowed {
        state.metrics.record_rate_rejection(bucket.as_str());
        state.record_request(class_label, "rate_limited");
        state
            .audit
            .record(
                SecurityEventKind::RateLimited,
                actor,
                Some(method.as_str()),
                Some(&path),
                Some(bucket.as_str()),
            )
            .await;
        return ApiError::TooManyRequests {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response();
    }

    match principal {
        None => {
            state.record_request(class_label, "forwarded");
            state
                .audit
                .record(
                    SecurityEventKind::PublicAccess,
                    actor,
                    Some(method.as_str()),
                    Some(&path),
                    None,
                )
                .await;
        }
        Some(principal) => {
            state.record_request(class_label, "authenticated");
            state
                .audit
                .record(
                    SecurityEventKind::ProtectedAccessGranted,
                    actor,
                    Some(method.as_str()),
                    Some(&path),
                    None,
                )
                .await;
            inject_identity(
                request.headers_mut(),
                &principal.username,
                &principal.roles,
                &client_ip,
            );
            request.extensions_mut().insert(principal);
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::Role;

    #[test]
    fn strips_every_trusted_header() {
        let mut headers = HeaderMap::new();
        for name in TRUSTED_IDENTITY_HEADERS {
            headers.insert(name, HeaderValue::from_static("forged"));
        }
        headers.insert("accept", HeaderValue::from_static("*/*"));
        assert_eq!(strip_identity_headers(&mut headers), TRUSTED_IDENTITY_HEADERS.len());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn injects_comma_joined_roles() {
        let mut headers = HeaderMap::new();
        let roles: RoleSet = [Role::Admin, Role::User].into_iter().collect();
        inject_identity(&mut headers, "admin", &roles, "10.1.2.3");
        assert_eq!(headers.get(X_USER_USERNAME).unwrap(), "admin");
        assert_eq!(headers.get(X_USER_ROLES).unwrap(), "USER,ADMIN");
        assert_eq!(headers.get(X_AUTH_VALID).unwrap(), "true");
        assert_eq!(headers.get(X_GATEWAY_VALIDATED).unwrap(), "true");
        assert_eq!(headers.get(X_CLIENT_IP).unwrap(), "10.1.2.3");
    }

    #[test]
    fn unauthorized_response_is_marked_failed() {
        let response = unauthorized("INVALID_TOKEN", INVALID_TOKEN_MESSAGE);
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(X_AUTH_STATUS).unwrap(), "FAILED");
        assert_eq!(response.headers().get("x-error-code").unwrap(), "INVALID_TOKEN");
    }
}
