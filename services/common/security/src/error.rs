use axum::response::{IntoResponse, Response};
use common_auth::Role;
use common_http_errors::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("request did not pass through the gateway")]  NotGatewayValidated,
    #[error("missing authenticated identity")]            MissingIdentity,
    #[error("unauthorized - missing required role")]
    MissingRole(Vec<Role>),
}

impl From<SecurityError> for ApiError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::NotGatewayValidated | SecurityError::MissingIdentity => {
                ApiError::Unauthorized {
                    code: "UNAUTHENTICATED",
                    message: "Authentication required".into(),
                }
            }
            SecurityError::MissingRole(roles) => ApiError::ForbiddenMissingRole {
                role: roles.iter().map(Role::as_str).collect::<Vec<_>>().join(","),
            },
        }
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
