//! Tests for utility functions

use seal_pipeline::util::clock::now_ms;
use seal_pipeline::util::telemetry::{init_tracing, DEFAULT_LOG_DIRECTIVE};
use seal_pipeline::util::serde::{ActorId, RegisteredSealProof, SectorId, TaskType, WorkerId};

#[test]
fn test_sector_id_display() {
    let sector = SectorId::new(1000, 42);
    assert_eq!(sector.miner, ActorId(1000));
    assert_eq!(sector.to_string(), "s-t01000-42");
    assert_eq!(ActorId(1000).to_string(), "f01000");
}

#[test]
fn test_sector_ids_order_by_miner_then_number() {
    let mut ids = vec![SectorId::new(2, 1), SectorId::new(1, 9), SectorId::new(1, 3)];
    ids.sort();
    assert_eq!(
        ids,
        vec![SectorId::new(1, 3), SectorId::new(1, 9), SectorId::new(2, 1)]
    );
}

#[test]
fn test_seal_proof_labels_parse_back() {
    for proof in RegisteredSealProof::ALL {
        assert_eq!(proof.label().parse::<RegisteredSealProof>(), Ok(proof));
    }
    assert!("stacked_drg_1kib".parse::<RegisteredSealProof>().is_err());
}

#[test]
fn test_seal_proof_serde_uses_label() {
    let json = serde_json::to_string(&RegisteredSealProof::StackedDrg32GiBV1_1).unwrap();
    assert_eq!(json, "\"stacked_drg_32gib_v1_1\"");
}

#[test]
fn test_sector_sizes() {
    assert_eq!(RegisteredSealProof::StackedDrg2KiBV1_1.sector_size(), 2048);
    assert_eq!(RegisteredSealProof::StackedDrg32GiBV1_1.sector_size(), 32 << 30);
}

#[test]
fn test_task_type_short_names() {
    assert_eq!(TaskType::PreCommit1.to_string(), "PC1");
    assert_eq!(TaskType::Commit2.short(), "C2");
}

#[test]
fn test_worker_ids_are_unique() {
    assert_ne!(WorkerId::new(), WorkerId::new());
}

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    assert!(a > 0);
    assert!(now_ms() >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    assert!(DEFAULT_LOG_DIRECTIVE.starts_with("seal_pipeline"));
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
