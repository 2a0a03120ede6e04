mod support;

use async_trait::async_trait;
use auth_service::credentials::DegradedMode;
use auth_service::store::{NewPrincipal, Principal, StoreError, UserStore};
use axum::http::StatusCode;
use chrono::Duration as ChronoDuration;
use common_audit::SecurityEventKind;
use common_auth::{AuthResult, Role, RoleSet};
use serde_json::json;
use std::sync::Arc;
use support::{body_json, get_request, json_request, json_request_as, login_request, TestApp};
use tower::ServiceExt;

#[tokio::test]
async fn admin_login_returns_bearer_token_with_admin_role() {
    let app = TestApp::seeded().await;
    let response = app
        .router
        .clone()
        .oneshot(login_request("admin", "admin123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "Bearer");
    assert_eq!(body["subject"], "admin");
    assert_eq!(body["roles"], "ADMIN");
    assert_eq!(body["expiresInSeconds"], 900);

    let token = body["token"].as_str().unwrap();
    assert_eq!(
        app.codec.decode(token),
        AuthResult::Valid {
            subject: "admin".into(),
            roles: RoleSet::single(Role::Admin)
        }
    );
    assert_eq!(app.audit.kinds(), vec![SecurityEventKind::LoginSucceeded]);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_get_identical_errors() {
    let app = TestApp::seeded().await;
    let wrong = app
        .router
        .clone()
        .oneshot(login_request("admin", "nope"))
        .await
        .unwrap();
    let unknown = app
        .router
        .clone()
        .oneshot(login_request("ghost", "admin123"))
        .await
        .unwrap();

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let wrong = body_json(wrong).await;
    let unknown = body_json(unknown).await;
    assert_eq!(wrong["message"], unknown["message"]);
    assert_eq!(wrong["code"], "INVALID_CREDENTIALS");
    assert_eq!(wrong["message"], "Invalid username or password");
}

#[tokio::test]
async fn email_identifier_logs_in_as_username() {
    let app = TestApp::seeded().await;
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            json!({"email": "test@example.com", "password": "test123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["subject"], "test");
}

#[tokio::test]
async fn validate_reports_subject_and_roles() {
    let app = TestApp::seeded().await;
    let token = app.codec.encode_default("user", &RoleSet::single(Role::User)).unwrap();

    let ok = app
        .router
        .clone()
        .oneshot(json_request("POST", "/auth/validate", json!({"token": token.as_str()})))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["subject"], "user");
    assert_eq!(body["roles"], "USER");

    app.clock.advance(ChronoDuration::minutes(16));
    let expired = app
        .router
        .clone()
        .oneshot(json_request("POST", "/auth/validate", json!({"token": token.as_str()})))
        .await
        .unwrap();
    assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(expired).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn refresh_issues_later_token_and_rejects_expired_input() {
    let app = TestApp::seeded().await;
    let original = app.codec.encode_default("admin", &RoleSet::single(Role::Admin)).unwrap();

    app.clock.advance(ChronoDuration::minutes(5));
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/auth/refresh", json!({"token": original.as_str()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["roles"], "ADMIN");
    let fresh = app.codec.verify(body["token"].as_str().unwrap()).unwrap();
    assert!(fresh.expires_at() > original.expires_at());

    app.clock.advance(ChronoDuration::minutes(20));
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/auth/refresh", json!({"token": original.as_str()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn me_prefers_store_profile_and_falls_back_to_token() {
    let app = TestApp::seeded().await;
    let admin = app.codec.encode_default("admin", &RoleSet::single(Role::Admin)).unwrap();
    let response = app
        .router
        .clone()
        .oneshot(get_request("/auth/me", Some(admin.as_str())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "admin@example.com");
    assert!(body.get("passwordHash").is_none());

    let orphan = app.codec.encode_default("legacy", &RoleSet::single(Role::Moderator)).unwrap();
    let body = body_json(
        app.router
            .clone()
            .oneshot(get_request("/auth/me", Some(orphan.as_str())))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["source"], "token");
    assert_eq!(body["roles"], "MODERATOR");

    let response = app.router.clone().oneshot(get_request("/auth/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["authenticated"], false);
}

#[tokio::test]
async fn register_then_check_availability() {
    let app = TestApp::seeded().await;
    let admin = app.token("admin", Role::Admin);
    let response = app
        .router
        .clone()
        .oneshot(json_request_as(
            "POST",
            "/auth/register",
            json!({
                "username": "neo",
                "email": "neo@example.com",
                "password": "matrix",
                "role": "moderator"
            }),
            &admin,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["username"], "neo");
    assert_eq!(body["user"]["roles"], json!(["MODERATOR"]));
    assert!(body["user"].get("password").is_none());

    let taken = body_json(
        app.router
            .clone()
            .oneshot(get_request("/auth/check-username/neo", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(taken, json!({"username": "neo", "available": false}));

    let free = body_json(
        app.router
            .clone()
            .oneshot(get_request("/auth/check-email/trinity@example.com", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(free["available"], true);

    let login = app
        .router
        .clone()
        .oneshot(login_request("neo", "matrix"))
        .await
        .unwrap();
    assert_eq!(body_json(login).await["roles"], "MODERATOR");
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_input() {
    let app = TestApp::seeded().await;
    let duplicate = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({"username": "admin", "email": "other@example.com", "password": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(duplicate.headers().get("X-Error-Code").unwrap(), "USERNAME_TAKEN");

    let bad_role = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({"username": "z", "email": "z@example.com", "password": "x", "role": "root"}),
        ))
        .await
        .unwrap();
    assert_eq!(bad_role.status(), StatusCode::BAD_REQUEST);

    let empty_password = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({"username": "z", "email": "z@example.com", "password": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(empty_password.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn self_registration_cannot_claim_a_privileged_role() {
    let app = TestApp::seeded().await;
    let body = json!({
        "username": "mallory",
        "email": "mallory@example.com",
        "password": "sneaky",
        "role": "ADMIN"
    });

    let anonymous = app
        .router
        .clone()
        .oneshot(json_request("POST", "/auth/register", body.clone()))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

    let plain_user = app.token("user", Role::User);
    let as_user = app
        .router
        .clone()
        .oneshot(json_request_as("POST", "/auth/register", body, &plain_user))
        .await
        .unwrap();
    assert_eq!(as_user.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(as_user).await["missing_role"], "ADMIN");

    let login = app
        .router
        .clone()
        .oneshot(login_request("mallory", "sneaky"))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_registration_defaults_to_user() {
    let app = TestApp::seeded().await;
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({"username": "trinity", "email": "trinity@example.com", "password": "zion"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user"]["roles"], json!(["USER"]));

    let explicit_user = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({
                "username": "tank",
                "email": "tank@example.com",
                "password": "operator",
                "role": "user"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(explicit_user.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = TestApp::seeded().await;
    for uri in ["/auth/login", "/auth/register"] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", uri, json!({"user": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            response.headers().get("X-Error-Code").unwrap(),
            "INVALID_REQUEST_BODY"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_REQUEST_BODY");
        assert!(body["message"].as_str().unwrap().contains("username"));
    }
}

struct DownStore;

#[async_trait]
impl UserStore for DownStore {
    async fn find_by_username(&self, _: &str) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn find_by_email(&self, _: &str) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn insert(&self, _: NewPrincipal) -> Result<Principal, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn store_outage_is_503_unless_degraded() {
    let strict = TestApp::with_store(Arc::new(DownStore), DegradedMode::Disabled);
    let response = strict
        .router
        .clone()
        .oneshot(login_request("admin", "admin123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let degraded = TestApp::with_store(Arc::new(DownStore), DegradedMode::BuiltInPrincipals);
    let response = degraded
        .router
        .clone()
        .oneshot(login_request("admin", "admin123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["roles"], "ADMIN");
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    let app = TestApp::seeded().await;
    let health = app.router.clone().oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    app.router
        .clone()
        .oneshot(login_request("user", "user123"))
        .await
        .unwrap();
    let metrics = app.router.clone().oneshot(get_request("/metrics", None)).await.unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = String::from_utf8(
        http_body_util::BodyExt::collect(metrics.into_body())
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(text.contains("auth_login_attempts_total"));
}
