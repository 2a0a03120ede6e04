use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common_audit::{AuditActor, SecurityEventKind};
use common_auth::{
    bearer_from_headers, ensure_role, AuthContext, AuthError, AuthResult, GuardError, Role,
    RoleSet, Token, INVALID_TOKEN_MESSAGE,
};
use common_http_errors::{ApiError, ERROR_CODE_HEADER};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::credentials::{with_store_timeout, CredentialSource};
use crate::password::{hash_password, PasswordError};
use crate::store::{NewPrincipal, StoreError, UserResponse};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "identifier", alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub subject: String,
    /// Retained for clients that read `username` instead of `subject`.
    pub username: String,
    pub roles: String,
    pub expires_in_seconds: i64,
}

impl TokenResponse {
    fn from_token(token: Token, now: chrono::DateTime<chrono::Utc>) -> Self {
        let expires_in_seconds = token.expires_in_seconds(now);
        let subject = token.subject().to_string();
        let roles = token.roles_claim();
        Self {
            token: token.into_string(),
            token_type: "Bearer",
            username: subject.clone(),
            subject,
            roles,
            expires_in_seconds,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(resp) => resp,
        Err(err) => ApiError::internal(err).into_response(),
    }
}

/// Malformed or mistyped bodies answer with the JSON error shape instead of
/// axum's plain-text rejection.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            info!(status = %rejection.status(), "request body rejected");
            Err(ApiError::bad_request("INVALID_REQUEST_BODY", rejection.body_text()))
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, Response> {
    let LoginRequest { username, password } =
        json_body(payload).map_err(IntoResponse::into_response)?;
    let actor = AuditActor {
        username: Some(username.trim().to_string()),
        ..Default::default()
    };

    match state.tokens.login(&username, &password).await {
        Ok(issued) => {
            let outcome = match issued.source {
                CredentialSource::Store => "success",
                CredentialSource::BuiltIn => "success_degraded",
            };
            state.record_login_metric(outcome);
            state
                .audit
                .record(
                    SecurityEventKind::LoginSucceeded,
                    actor,
                    Some("POST"),
                    Some("/auth/login"),
                    None,
                )
                .await;
            Ok(Json(TokenResponse::from_token(issued.token, state.codec.now())))
        }
        Err(err) => {
            let outcome = if err.is_credential_error() {
                "invalid_credentials"
            } else {
                "error"
            };
            state.record_login_metric(outcome);
            state
                .audit
                .record(
                    SecurityEventKind::LoginFailed,
                    actor,
                    Some("POST"),
                    Some("/auth/login"),
                    Some(&err.to_string()),
                )
                .await;
            Err(err.into_response())
        }
    }
}

fn token_from_request(headers: &HeaderMap, body: Option<TokenRequest>) -> Option<String> {
    body.and_then(|b| b.token)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_from_headers(headers).ok())
}

/// Introspection for other services. Always answers with a `valid` flag; the
/// cause of a rejection is logged, never returned.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<TokenRequest>>,
) -> Response {
    let token = token_from_request(&headers, body.map(|Json(b)| b)).unwrap_or_default();
    match state.tokens.validate(&token) {
        AuthResult::Valid { subject, roles } => {
            state.record_token_metric("validate", "valid");
            Json(json!({
                "valid": true,
                "subject": subject,
                "username": subject,
                "roles": roles.to_claim(),
            }))
            .into_response()
        }
        rejected => {
            state.record_token_metric("validate", rejected.reason());
            info!(reason = rejected.reason(), "token validation rejected");
            invalid_token_response(json!({ "valid": false, "message": INVALID_TOKEN_MESSAGE }))
        }
    }
}

fn invalid_token_response(body: serde_json::Value) -> Response {
    let mut resp = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    resp.headers_mut()
        .insert(ERROR_CODE_HEADER, HeaderValue::from_static("INVALID_TOKEN"));
    resp
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<TokenRequest>>,
) -> Result<Json<TokenResponse>, AuthError> {
    let token =
        token_from_request(&headers, body.map(|Json(b)| b)).ok_or(AuthError::TokenMissing)?;
    match state.tokens.refresh(&token).await {
        Ok(fresh) => {
            state.record_token_metric("refresh", "success");
            let actor = AuditActor {
                username: Some(fresh.subject().to_string()),
                roles: Some(fresh.roles_claim()),
                ..Default::default()
            };
            state
                .audit
                .record(
                    SecurityEventKind::TokenRefreshed,
                    actor,
                    Some("POST"),
                    Some("/auth/refresh"),
                    None,
                )
                .await;
            Ok(Json(TokenResponse::from_token(fresh, state.codec.now())))
        }
        Err(err) => {
            state.record_token_metric("refresh", err.code());
            Err(err)
        }
    }
}

/// Profile of the bearer. Falls back to what the token itself says when the
/// store has no record or cannot be reached.
pub async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = bearer_from_headers(&headers).unwrap_or_default();
    let (subject, roles) = match state.codec.decode(&token) {
        AuthResult::Valid { subject, roles } => (subject, roles),
        rejected => {
            info!(reason = rejected.reason(), "profile request rejected");
            return invalid_token_response(json!({
                "authenticated": false,
                "message": "Invalid or missing token",
            }));
        }
    };

    let by_username =
        with_store_timeout(state.store_timeout, state.store.find_by_username(&subject)).await;
    let found = match by_username {
        Ok(Some(p)) => Ok(Some(p)),
        Ok(None) => {
            with_store_timeout(state.store_timeout, state.store.find_by_email(&subject)).await
        }
        Err(err) => Err(err),
    };

    match found {
        Ok(Some(principal)) => Json(UserResponse::from(&principal)).into_response(),
        Ok(None) => token_profile(&subject, &roles),
        Err(err) => {
            warn!(
                error = %err,
                username = %subject,
                "profile lookup failed; answering from token"
            );
            token_profile(&subject, &roles)
        }
    }
}

fn token_profile(subject: &str, roles: &RoleSet) -> Response {
    Json(json!({
        "username": subject,
        "roles": roles.to_claim(),
        "authenticated": true,
        "source": "token",
    }))
    .into_response()
}

/// Self-registration always yields USER. Any other role is granted only to
/// a caller whose bearer token carries ADMIN.
pub async fn register(
    State(state): State<AppState>,
    caller: Option<AuthContext>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let RegisterRequest {
        username,
        email,
        password,
        role,
    } = json_body(payload)?;

    let username = username.trim().to_string();
    let email = email.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("INVALID_USERNAME", "Username must not be empty"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("INVALID_EMAIL", "Email address is not valid"));
    }
    let role = match role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|err| ApiError::bad_request("INVALID_ROLE", err.to_string()))?,
        None => Role::User,
    };
    if role != Role::User {
        let granted = match &caller {
            Some(ctx) => ensure_role(ctx, &[Role::Admin]),
            None => Err(GuardError::Forbidden {
                required: vec![Role::Admin],
            }),
        };
        if let Err(denied) = granted {
            warn!(
                username = %username,
                requested = role.as_str(),
                caller = caller.as_ref().map(|c| c.subject.as_str()).unwrap_or("anonymous"),
                "privileged registration refused"
            );
            return Err(denied.into());
        }
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(|err| match err {
            PasswordError::Empty => ApiError::bad_request("INVALID_PASSWORD", err.to_string()),
            PasswordError::Hash(_) => {
                error!(error = %err, "password hashing failed");
                ApiError::Internal { message: None }
            }
        })?;

    let created = with_store_timeout(
        state.store_timeout,
        state.store.insert(NewPrincipal {
            username,
            email,
            password_hash,
            roles: RoleSet::single(role),
        }),
    )
    .await
    .map_err(store_error)?;

    info!(username = %created.username, roles = %created.roles, "user registered");
    Ok(Json(json!({
        "message": "User registered successfully!",
        "user": UserResponse::from(&created),
    })))
}

#[derive(Deserialize, Serialize)]
pub struct Availability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub available: bool,
}

pub async fn check_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Availability>, ApiError> {
    let exists = with_store_timeout(state.store_timeout, state.store.username_exists(&username))
        .await
        .map_err(store_error)?;
    Ok(Json(Availability {
        username: Some(username),
        email: None,
        available: !exists,
    }))
}

pub async fn check_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Availability>, ApiError> {
    let exists = with_store_timeout(state.store_timeout, state.store.email_exists(&email))
        .await
        .map_err(store_error)?;
    Ok(Json(Availability {
        username: None,
        email: Some(email),
        available: !exists,
    }))
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict { field, value } => {
            let code = if field == "email" {
                "EMAIL_TAKEN"
            } else {
                "USERNAME_TAKEN"
            };
            ApiError::Conflict {
                code,
                message: format!("{} already exists: {value}", capitalise(field)),
            }
        }
        StoreError::Unavailable(cause) => {
            warn!(cause = %cause, "user store unavailable");
            ApiError::from(AuthError::StoreUnavailable(cause))
        }
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
