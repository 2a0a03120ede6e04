use axum::http::HeaderMap;
use common_audit::{
    extract_actor_from_headers, AuditActor, AuditProducer, AuditSeverity, MemoryAuditSink,
    SecurityEventKind, TracingAuditSink,
};

#[test]
fn actor_comes_from_trusted_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("X-User-Username", "admin".parse().unwrap());
    headers.insert("X-User-Roles", "ADMIN".parse().unwrap());
    headers.insert("X-Client-IP", "10.0.0.7".parse().unwrap());
    let actor = extract_actor_from_headers(&headers);
    assert_eq!(actor.username.as_deref(), Some("admin"));
    assert_eq!(actor.roles.as_deref(), Some("ADMIN"));
    assert_eq!(actor.client_ip.as_deref(), Some("10.0.0.7"));
}

#[test]
fn blank_headers_are_ignored() {
    let mut headers = HeaderMap::new();
    headers.insert("X-User-Username", "   ".parse().unwrap());
    let actor = extract_actor_from_headers(&headers);
    assert_eq!(actor, AuditActor::default());
}

#[tokio::test]
async fn memory_sink_records_events_in_order() {
    let sink = MemoryAuditSink::new();
    let producer = AuditProducer::new(sink.clone(), "api-gateway");
    producer
        .record(
            SecurityEventKind::PublicAccess,
            AuditActor::default(),
            Some("POST"),
            Some("/auth/login"),
            None,
        )
        .await;
    let ev = producer
        .emit(
            SecurityEventKind::AuthFailure,
            AuditActor { client_ip: Some("1.2.3.4".into()), ..Default::default() },
            Some("GET"),
            Some("/admin/x"),
            Some("missing"),
        )
        .await
        .expect("emit");

    assert_eq!(ev.severity, AuditSeverity::Security);
    assert_eq!(ev.source_service, "api-gateway");
    assert_eq!(
        sink.kinds(),
        vec![SecurityEventKind::PublicAccess, SecurityEventKind::AuthFailure]
    );
    assert_eq!(sink.events()[1].reason.as_deref(), Some("missing"));
}

#[tokio::test]
async fn tracing_sink_accepts_events() {
    let producer = AuditProducer::new(TracingAuditSink, "auth-service");
    let ev = producer
        .emit(SecurityEventKind::LoginSucceeded, AuditActor::default(), None, None, None)
        .await
        .expect("emit");
    assert_eq!(ev.kind, SecurityEventKind::LoginSucceeded);
    let json = serde_json::to_value(&ev).unwrap();
    assert_eq!(json["kind"], "login_succeeded");
    assert!(json.get("path").is_none());
}
