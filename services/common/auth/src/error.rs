use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::warn;

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Failure taxonomy for credential checks, token handling and configuration.
///
/// Display strings carry the full cause for internal logs. Callers only ever
/// see the collapsed messages produced by [`AuthError::public_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("account is locked")]
    AccountLocked,
    #[error("account has expired")]
    AccountExpired,
    #[error("credentials have expired")]
    CredentialsExpired,
    #[error("token has expired")]
    TokenExpired,
    #[error("token is malformed or its signature does not verify")]
    TokenMalformed,
    #[error("token was issued by an unexpected issuer")]
    TokenWrongIssuer,
    #[error("bearer token missing")]
    TokenMissing,
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("user store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Signing(value.to_string())
    }
}

impl AuthError {
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::AccountDisabled
                | AuthError::AccountLocked
                | AuthError::AccountExpired
                | AuthError::CredentialsExpired
        )
    }

    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired
                | AuthError::TokenMalformed
                | AuthError::TokenWrongIssuer
                | AuthError::TokenMissing
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            e if e.is_credential_error() => "INVALID_CREDENTIALS",
            e if e.is_token_error() => "INVALID_TOKEN",
            AuthError::InvalidClaim(_, _) => "INVALID_CLAIM",
            AuthError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            _ => "SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            e if e.is_credential_error() || e.is_token_error() => StatusCode::UNAUTHORIZED,
            AuthError::InvalidClaim(_, _) => StatusCode::BAD_REQUEST,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to callers. Never distinguishes a wrong password
    /// from an unknown user, nor an expired token from a forged one.
    pub fn public_message(&self) -> &'static str {
        match self {
            e if e.is_credential_error() => INVALID_CREDENTIALS_MESSAGE,
            e if e.is_token_error() => INVALID_TOKEN_MESSAGE,
            AuthError::InvalidClaim(_, _) => "Invalid token request",
            AuthError::StoreUnavailable(_) => "Authentication service temporarily unavailable",
            _ => "Internal server error",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        let code = value.code();
        let message = value.public_message().to_string();
        match value.status() {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized { code, message },
            StatusCode::BAD_REQUEST => ApiError::BadRequest {
                code,
                message: Some(message),
            },
            StatusCode::SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable { code, message },
            _ => ApiError::Internal { message: None },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        warn!(error = %self, code = self.code(), "authentication request rejected");
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_share_one_public_message() {
        let variants = [
            AuthError::InvalidCredentials,
            AuthError::AccountDisabled,
            AuthError::AccountLocked,
            AuthError::AccountExpired,
            AuthError::CredentialsExpired,
        ];
        for err in variants {
            assert_eq!(err.public_message(), INVALID_CREDENTIALS_MESSAGE);
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn token_errors_do_not_reveal_cause() {
        let variants = [
            AuthError::TokenExpired,
            AuthError::TokenMalformed,
            AuthError::TokenWrongIssuer,
            AuthError::TokenMissing,
        ];
        for err in variants {
            assert_eq!(err.public_message(), INVALID_TOKEN_MESSAGE);
            assert_eq!(err.code(), "INVALID_TOKEN");
        }
    }

    #[test]
    fn store_outage_maps_to_service_unavailable() {
        let response = AuthError::StoreUnavailable("timeout".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("X-Error-Code").unwrap(),
            "STORE_UNAVAILABLE"
        );
    }
}
