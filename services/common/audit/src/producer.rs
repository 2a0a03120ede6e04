use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    AuditActor, AuditError, AuditResult, AuditSeverity, SecurityAuditEvent, SecurityEventKind,
    AUDIT_EVENT_VERSION,
};

/// Tracing target for security audit entries; route it separately with
/// `RUST_LOG=security=info`.
pub const AUDIT_TARGET: &str = "security";

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: &SecurityAuditEvent) -> AuditResult<()>;
}

/// Writes each event as one structured log line on the `security` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: &SecurityAuditEvent) -> AuditResult<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let username = event.actor.username.as_deref().unwrap_or("-");
        let client_ip = event.actor.client_ip.as_deref().unwrap_or("-");
        let path = event.path.as_deref().unwrap_or("-");
        match event.severity {
            AuditSeverity::Info => info!(
                target: AUDIT_TARGET,
                kind = event.kind.as_str(),
                username,
                client_ip,
                path,
                audit = %payload,
                "security audit"
            ),
            AuditSeverity::Warning | AuditSeverity::Security => warn!(
                target: AUDIT_TARGET,
                kind = event.kind.as_str(),
                username,
                client_ip,
                path,
                reason = event.reason.as_deref().unwrap_or("-"),
                audit = %payload,
                "security audit"
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory; used by tests to assert on what was recorded.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<SecurityAuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityAuditEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn emit(&self, event: &SecurityAuditEvent) -> AuditResult<()> {
        self.events
            .lock()
            .map_err(|_| AuditError::Sink("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn emit(&self, _event: &SecurityAuditEvent) -> AuditResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditProducer {
    sink: Arc<dyn AuditSink>,
    source_service: String,
}

impl AuditProducer {
    pub fn new<S: AuditSink + 'static>(sink: S, source_service: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(sink),
            source_service: source_service.into(),
        }
    }

    pub fn tracing(source_service: impl Into<String>) -> Self {
        Self::new(TracingAuditSink, source_service)
    }

    pub fn noop() -> Self {
        Self::new(NoopAuditSink, "noop")
    }

    pub fn source_service(&self) -> &str {
        &self.source_service
    }

    pub async fn emit(
        &self,
        kind: SecurityEventKind,
        actor: AuditActor,
        method: Option<&str>,
        path: Option<&str>,
        reason: Option<&str>,
    ) -> AuditResult<SecurityAuditEvent> {
        let event = SecurityAuditEvent {
            event_id: Uuid::new_v4(),
            event_version: AUDIT_EVENT_VERSION,
            kind,
            severity: kind.default_severity(),
            occurred_at: Utc::now(),
            source_service: self.source_service.clone(),
            actor,
            method: method.map(str::to_string),
            path: path.map(str::to_string),
            reason: reason.map(str::to_string),
        };
        self.sink.emit(&event).await?;
        Ok(event)
    }

    /// Fire-and-log variant for request paths: a failing sink must not fail
    /// the request it is auditing.
    pub async fn record(
        &self,
        kind: SecurityEventKind,
        actor: AuditActor,
        method: Option<&str>,
        path: Option<&str>,
        reason: Option<&str>,
    ) {
        if let Err(err) = self.emit(kind, actor, method, path, reason).await {
            warn!(error = %err, kind = kind.as_str(), "failed to emit audit event");
        }
    }
}

/// Actor as described by the gateway-injected identity headers.
pub fn extract_actor_from_headers(headers: &HeaderMap) -> AuditActor {
    fn header_str(map: &HeaderMap, name: &str) -> Option<String> {
        map.get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
    AuditActor {
        username: header_str(headers, "X-User-Username"),
        roles: header_str(headers, "X-User-Roles"),
        client_ip: header_str(headers, "X-Client-IP"),
    }
}
