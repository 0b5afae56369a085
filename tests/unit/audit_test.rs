//! Tests for audit sink

use seal_pipeline::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};
use seal_pipeline::util::serde::SectorId;

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let sector = SectorId::new(1000, 4);

    sink.record(build_audit_event(sector, "sdr", AuditAction::Claim, Some(12), None));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sector, sector);
    assert_eq!(events[0].stage, "sdr");
    assert_eq!(events[0].action, AuditAction::Claim);
    assert_eq!(events[0].task_id, Some(12));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for n in 1..=3 {
        sink.record(build_audit_event(
            SectorId::new(1000, n),
            "trees",
            AuditAction::Claim,
            None,
            None,
        ));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].sector.number.0, 2); // oldest dropped
    assert_eq!(events[1].sector.number.0, 3);
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(SectorId::new(1, 1), "sdr", AuditAction::Claim, None, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        SectorId::new(1000, 7),
        "precommit",
        AuditAction::LandingUnresolved,
        None,
        Some("bafy-msg".to_string()),
    );

    assert_eq!(event.detail, Some("bafy-msg".to_string()));
    assert!(event.created_at_ms > 0);
    assert!(event
        .event_id
        .starts_with("s-t01000-7-precommit-landing_unresolved-"));
}
