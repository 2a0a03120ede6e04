mod support;

use axum::http::StatusCode;
use common_audit::SecurityEventKind;
use common_auth::Role;
use support::{body_json, echoed_headers, header_str, request, TestGateway};
use tower::ServiceExt;

#[tokio::test]
async fn admin_token_is_forwarded_with_identity_headers() {
    let gateway = TestGateway::with_echo().await;
    let token = gateway.token("admin", Role::Admin);

    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/admin/x", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["path"], "/admin/x");
    let headers = echoed_headers(&body);
    assert_eq!(headers["x-user-username"], "admin");
    assert_eq!(headers["x-user-roles"], "ADMIN");
    assert_eq!(headers["x-auth-valid"], "true");
    assert_eq!(headers["x-gateway-validated"], "true");
    assert_eq!(headers["x-client-ip"], "unknown");
    assert_eq!(
        gateway.audit.kinds(),
        vec![SecurityEventKind::ProtectedAccessGranted]
    );
    assert_eq!(gateway.metrics.request_count("protected", "authenticated"), 1);
}

#[tokio::test]
async fn protected_path_without_token_is_rejected() {
    let gateway = TestGateway::with_echo().await;
    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/admin/x", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(response.headers(), "x-auth-status"), Some("FAILED"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Missing or invalid Authorization header");
    assert!(body["timestamp"].is_string());
    assert_eq!(gateway.audit.kinds(), vec![SecurityEventKind::AuthFailure]);
}

#[tokio::test]
async fn forged_and_expired_tokens_get_the_same_answer() {
    let gateway = TestGateway::with_echo().await;
    let token = gateway.token("admin", Role::Admin);
    let idx = token.len() - 5;
    let replacement = if &token[idx..idx + 1] == "A" { "B" } else { "A" };
    let mut forged = token.clone();
    forged.replace_range(idx..idx + 1, replacement);

    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/movies", Some(&forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(response.headers(), "x-error-code"), Some("INVALID_TOKEN"));
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid or expired JWT token");

    let events = gateway.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason.as_deref(), Some("malformed_signature"));
}

#[tokio::test]
async fn unlisted_paths_are_denied_by_default() {
    let gateway = TestGateway::with_echo().await;
    for path in ["/movies", "/auth/validate", "/auth/refresh", "/metrics", "/anything/else"] {
        let response = gateway
            .router
            .clone()
            .oneshot(request("GET", path, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn public_paths_pass_without_token_and_without_identity() {
    let gateway = TestGateway::with_echo().await;
    let response = gateway
        .router
        .clone()
        .oneshot(request("POST", "/auth/login", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["method"], "POST");
    assert!(echoed_headers(&body).get("x-user-username").is_none());
    assert_eq!(gateway.audit.kinds(), vec![SecurityEventKind::PublicAccess]);
}

#[tokio::test]
async fn dot_segments_cannot_reach_protected_routes_anonymously() {
    let gateway = TestGateway::with_echo().await;
    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/static/../admin/x", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn client_supplied_identity_headers_are_stripped() {
    let gateway = TestGateway::with_echo().await;

    let spoofed = axum::http::Request::builder()
        .method("GET")
        .uri("/static/app.js")
        .header("X-User-Username", "admin")
        .header("X-User-Roles", "ADMIN")
        .header("X-Gateway-Validated", "true")
        .header("X-Auth-Valid", "true")
        .header("X-Forwarded-For", "203.0.113.9")
        .body(axum::body::Body::empty())
        .unwrap();
    let body = body_json(gateway.router.clone().oneshot(spoofed).await.unwrap()).await;
    let headers = echoed_headers(&body);
    assert!(headers.get("x-user-username").is_none());
    assert!(headers.get("x-user-roles").is_none());
    assert!(headers.get("x-gateway-validated").is_none());

    let token = gateway.token("user", Role::User);
    let escalation = axum::http::Request::builder()
        .method("GET")
        .uri("/movies")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-User-Roles", "ADMIN")
        .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
        .body(axum::body::Body::empty())
        .unwrap();
    let body = body_json(gateway.router.clone().oneshot(escalation).await.unwrap()).await;
    let headers = echoed_headers(&body);
    assert_eq!(headers["x-user-roles"], "USER");
    assert_eq!(headers["x-client-ip"], "203.0.113.9");
}

#[tokio::test]
async fn health_is_served_locally() {
    let gateway = TestGateway::without_upstreams();
    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_require_an_admin_token() {
    let gateway = TestGateway::without_upstreams();
    let anonymous = gateway
        .router
        .clone()
        .oneshot(request("GET", "/metrics", None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let token = gateway.token("admin", Role::Admin);
    let authorised = gateway
        .router
        .clone()
        .oneshot(request("GET", "/metrics", Some(&token)))
        .await
        .unwrap();
    assert_eq!(authorised.status(), StatusCode::OK);

    let user = gateway.token("user", Role::User);
    let forbidden = gateway
        .router
        .clone()
        .oneshot(request("GET", "/metrics", Some(&user)))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_upstream_is_404_and_dead_upstream_is_502() {
    let gateway = TestGateway::without_upstreams();
    let token = gateway.token("user", Role::User);
    let response = gateway
        .router
        .clone()
        .oneshot(request("GET", "/movies", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let dead = TestGateway::with_routes("/movies=http://127.0.0.1:1");
    let response = dead
        .router
        .clone()
        .oneshot(request("GET", "/movies", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header_str(response.headers(), "x-error-code"), Some("BAD_GATEWAY"));
}
