use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use axum::{
    extract::Request,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Serialize;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";
const MAX_ERROR_CODES: usize = 40;
const OVERFLOW_CODE: &str = "_other";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: &'static str,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { code: &'static str, message: String },
    ForbiddenMissingRole { role: String },
    Forbidden,
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { code: &'static str },
    Conflict { code: &'static str, message: String },
    TooManyRequests { retry_after_secs: u64 },
    BadGateway { message: String },
    GatewayTimeout,
    ServiceUnavailable { code: &'static str, message: String },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal {
            message: Some(e.to_string()),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: Some(message.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenMissingRole { .. } | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { code, .. }
            | ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code }
            | ApiError::Conflict { code, .. }
            | ApiError::ServiceUnavailable { code, .. } => code,
            ApiError::ForbiddenMissingRole { .. } => "missing_role",
            ApiError::Forbidden => "forbidden",
            ApiError::TooManyRequests { .. } => "RATE_LIMITED",
            ApiError::BadGateway { .. } => "BAD_GATEWAY",
            ApiError::GatewayTimeout => "GATEWAY_TIMEOUT",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let error = status.canonical_reason().unwrap_or("Error");
        let mut retry_after = None;
        let (missing_role, message) = match self {
            ApiError::ForbiddenMissingRole { role } => (Some(role), None),
            ApiError::Unauthorized { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::BadGateway { message }
            | ApiError::ServiceUnavailable { message, .. } => (None, Some(message)),
            ApiError::BadRequest { message, .. } | ApiError::Internal { message } => {
                (None, message)
            }
            ApiError::TooManyRequests { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (None, Some("Too many requests".to_string()))
            }
            ApiError::GatewayTimeout => (None, Some("Upstream service timed out".to_string())),
            ApiError::Forbidden | ApiError::NotFound { .. } => (None, None),
        };
        let body = ErrorBody {
            error,
            code: error_code.into(),
            missing_role,
            message,
            timestamp: Utc::now().to_rfc3339(),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        if let Some(secs) = retry_after {
            resp.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

static HTTP_ERRORS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_errors_total",
        "Error responses by service, status and X-Error-Code",
        &["service", "status", "code"]
    )
    .ok()
});

static SEEN_CODES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Caps the `code` label so arbitrary upstream codes cannot blow up series
/// count.
fn bounded_code(code: &str) -> String {
    let Ok(mut seen) = SEEN_CODES.lock() else {
        return OVERFLOW_CODE.to_string();
    };
    if seen.contains(code) {
        return code.to_string();
    }
    if seen.len() >= MAX_ERROR_CODES {
        return OVERFLOW_CODE.to_string();
    }
    seen.insert(code.to_string());
    code.to_string()
}

pub fn record_error(service: &str, status: StatusCode, code: &str) {
    if let Some(counter) = HTTP_ERRORS.as_ref() {
        counter
            .with_label_values(&[service, status.as_str(), &bounded_code(code)])
            .inc();
    }
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// `axum::middleware::from_fn` layer counting every 4xx/5xx by its
/// `X-Error-Code` header in the process-wide Prometheus registry.
pub fn http_error_metrics_layer(
    service: &'static str,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let resp = next.run(req).await;
            let status = resp.status();
            if status.is_client_error() || status.is_server_error() {
                let code = resp
                    .headers()
                    .get(ERROR_CODE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none");
                record_error(service, status, code);
            }
            resp
        })
    }
}
