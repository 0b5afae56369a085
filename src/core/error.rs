//! Error types for pipeline polling and scheduling.

use thiserror::Error;

use crate::core::claim::PollerStage;

/// Errors produced by pipeline components.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline state store failure (query or statement).
    #[error("store error: {0}")]
    Store(String),
    /// Chain state query failure.
    #[error("chain error: {0}")]
    Chain(String),
    /// A conditional claim did not affect exactly one row.
    #[error("claim {stage} for sp {sp_id} sector {sector_number}: expected to update 1 row, updated {affected}")]
    ClaimConflict {
        /// Stage whose claim was attempted.
        stage: PollerStage,
        /// Provider id of the record.
        sp_id: u64,
        /// Sector number of the record.
        sector_number: u64,
        /// Rows the conditional update reported.
        affected: u64,
    },
    /// The task execution service refused or failed a registration.
    #[error("task registration failed: {0}")]
    Registration(String),
    /// Configuration did not validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// True when the error signals a broken claim invariant rather than a
    /// transient infrastructure failure.
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::ClaimConflict { .. })
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_conflict_is_invariant_violation() {
        let err = PipelineError::ClaimConflict {
            stage: PollerStage::PoRep,
            sp_id: 1000,
            sector_number: 7,
            affected: 0,
        };
        assert!(err.is_invariant_violation());
        assert!(!PipelineError::Store("timeout".into()).is_invariant_violation());
        assert_eq!(
            err.to_string(),
            "claim porep for sp 1000 sector 7: expected to update 1 row, updated 0"
        );
    }
}
