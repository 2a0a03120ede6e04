use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::{routing::get, Router};
use common_security::{ensure_role, GatewayIdentity, Role, SecurityError};
use serde_json::Value;
use tower::ServiceExt;

async fn whoami(GatewayIdentity(ctx): GatewayIdentity) -> String {
    ctx.username
}

async fn admin_only(GatewayIdentity(ctx): GatewayIdentity) -> Result<&'static str, SecurityError> {
    ensure_role(&ctx, Role::Admin)?;
    Ok("ok")
}

fn app() -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/admin", get(admin_only))
}

fn request(uri: &str, username: Option<&str>, roles: &str) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = username {
        builder = builder
            .header("X-Gateway-Validated", "true")
            .header("X-Auth-Valid", "true")
            .header("X-User-Username", user)
            .header("X-User-Roles", roles);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn identity_headers_reach_handler() {
    let resp = app().oneshot(request("/whoami", Some("alice"), "USER")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"alice");
}

#[tokio::test]
async fn request_without_gateway_headers_is_unauthorized() {
    let resp = app().oneshot(request("/whoami", None, "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "UNAUTHENTICATED");
}

#[tokio::test]
async fn missing_role_is_forbidden() {
    let resp = app().oneshot(request("/admin", Some("alice"), "USER")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");
    let bytes = to_bytes(resp.into_body(), 4096).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["missing_role"], "ADMIN");
}

#[tokio::test]
async fn admin_passes_role_check() {
    let resp = app().oneshot(request("/admin", Some("root"), "ADMIN")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
