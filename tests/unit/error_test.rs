//! Tests for error types

use seal_pipeline::core::{PipelineError, PollerStage};

#[test]
fn test_store_error() {
    let err = PipelineError::Store("connection reset".to_string());
    assert_eq!(format!("{err}"), "store error: connection reset");
    assert!(!err.is_invariant_violation());
}

#[test]
fn test_chain_error() {
    let err = PipelineError::Chain("head unavailable".to_string());
    assert_eq!(format!("{err}"), "chain error: head unavailable");
}

#[test]
fn test_claim_conflict_error() {
    let err = PipelineError::ClaimConflict {
        stage: PollerStage::Trees,
        sp_id: 1000,
        sector_number: 3,
        affected: 2,
    };
    assert_eq!(
        format!("{err}"),
        "claim trees for sp 1000 sector 3: expected to update 1 row, updated 2"
    );
    assert!(err.is_invariant_violation());
}

#[test]
fn test_registration_error() {
    let err = PipelineError::Registration("sdr handle already registered".to_string());
    assert_eq!(
        format!("{err}"),
        "task registration failed: sdr handle already registered"
    );
}
