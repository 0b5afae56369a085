//! Typed query surface of the pipeline state store.

use async_trait::async_trait;

use crate::core::claim::PollerStage;
use crate::core::record::{ChainConfirmation, MessageKind, ProgressRecord, Stage, StageOutput};
use crate::core::PipelineError;
use crate::util::serde::{ChainEpoch, RegisteredSealProof, SectorId, TaskId, TipSetKey};

/// Pipeline state store.
///
/// Statements that change a row return the number of rows they affected so
/// callers can enforce their own expectations; the store never interprets a
/// zero-row update as an error.
#[async_trait]
pub trait PipelineStore: Send + Sync + 'static {
    /// All records whose prove-commit has not landed, failed ones included.
    async fn load_active(&self) -> Result<Vec<ProgressRecord>, PipelineError>;

    /// Conditional claim update (see [`PollerStage::update_sql`]).
    async fn claim(
        &self,
        stage: PollerStage,
        sector: SectorId,
        task_id: TaskId,
    ) -> Result<u64, PipelineError>;

    /// Execution outcome of the record's submitted message, joined against the
    /// message wait table. `None` until the message has executed.
    async fn message_execution(
        &self,
        sector: SectorId,
        kind: MessageKind,
    ) -> Result<Option<ChainConfirmation>, PipelineError>;

    /// Record a landed pre-commit: seed epoch, executing tipset, success flag.
    /// Applies only while `seed_epoch` is unset.
    async fn set_precommit_landed(
        &self,
        sector: SectorId,
        seed_epoch: ChainEpoch,
        tsk: &TipSetKey,
    ) -> Result<u64, PipelineError>;

    /// Record a landed prove-commit; the record becomes terminal.
    /// Applies only while the success flag is false.
    async fn set_commit_landed(&self, sector: SectorId, tsk: &TipSetKey)
        -> Result<u64, PipelineError>;

    /// Add a sector to the pipeline.
    async fn insert_sector(
        &self,
        sector: SectorId,
        proof: RegisteredSealProof,
    ) -> Result<(), PipelineError>;

    /// Completion callback: mark a claimed stage finished and store its output.
    /// Applies only when the stage has a task id and is not yet done.
    async fn complete_stage(
        &self,
        sector: SectorId,
        stage: Stage,
        output: StageOutput,
    ) -> Result<u64, PipelineError>;

    /// Mark a record failed with an operator-facing reason.
    async fn mark_failed(&self, sector: SectorId, reason: &str) -> Result<u64, PipelineError>;

    /// Record the execution outcome of a signed message (chain indexer feed).
    async fn record_message_execution(
        &self,
        signed_cid: &str,
        outcome: ChainConfirmation,
    ) -> Result<(), PipelineError>;
}
