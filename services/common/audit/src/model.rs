use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Who the event is about. Every field is optional because rejected requests
/// may carry no identity at all.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuditActor {
    pub username: Option<String>,
    pub roles: Option<String>,
    pub client_ip: Option<String>,
}

pub const AUDIT_EVENT_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    #[default]
    Info,
    Warning,
    Security,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    PublicAccess,
    ProtectedAccessGranted,
    AuthFailure,
    RateLimited,
    LoginSucceeded,
    LoginFailed,
    TokenRefreshed,
    ResourceCreated,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::PublicAccess => "public_access",
            SecurityEventKind::ProtectedAccessGranted => "protected_access_granted",
            SecurityEventKind::AuthFailure => "auth_failure",
            SecurityEventKind::RateLimited => "rate_limited",
            SecurityEventKind::LoginSucceeded => "login_succeeded",
            SecurityEventKind::LoginFailed => "login_failed",
            SecurityEventKind::TokenRefreshed => "token_refreshed",
            SecurityEventKind::ResourceCreated => "resource_created",
        }
    }

    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            SecurityEventKind::PublicAccess
            | SecurityEventKind::ProtectedAccessGranted
            | SecurityEventKind::LoginSucceeded
            | SecurityEventKind::TokenRefreshed
            | SecurityEventKind::ResourceCreated => AuditSeverity::Info,
            SecurityEventKind::RateLimited => AuditSeverity::Warning,
            SecurityEventKind::AuthFailure | SecurityEventKind::LoginFailed => {
                AuditSeverity::Security
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityAuditEvent {
    pub event_id: Uuid,
    pub event_version: i32,
    pub kind: SecurityEventKind,
    pub severity: AuditSeverity,
    pub occurred_at: DateTime<Utc>,
    pub source_service: String,
    pub actor: AuditActor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Internal cause, e.g. `expired` or `wrong_issuer`. Never sent to clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("audit sink error: {0}")]
    Sink(String),
}

pub type AuditResult<T> = Result<T, AuditError>;
