pub mod model;
pub mod producer;

pub use model::{
    AuditActor, AuditError, AuditResult, AuditSeverity, SecurityAuditEvent, SecurityEventKind,
    AUDIT_EVENT_VERSION,
};
pub use producer::{
    extract_actor_from_headers, AuditProducer, AuditSink, MemoryAuditSink, NoopAuditSink,
    TracingAuditSink, AUDIT_TARGET,
};
