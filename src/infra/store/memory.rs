//! In-memory pipeline store.
//!
//! Rows live in a `BTreeMap` keyed by sector, so loads come back in
//! `(sp_id, sector_number)` order like the SQL store's primary key scan. Every
//! conditional statement is evaluated under one lock, which gives claims the
//! same all-or-nothing behaviour as a single-row `UPDATE`.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::claim::PollerStage;
use crate::core::record::{ChainConfirmation, MessageKind, ProgressRecord, Stage, StageOutput};
use crate::core::store::PipelineStore;
use crate::core::PipelineError;
use crate::util::serde::{ChainEpoch, RegisteredSealProof, SectorId, TaskId, TipSetKey};

/// Store operations that can be made to fail once, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`PipelineStore::load_active`].
    LoadActive,
    /// [`PipelineStore::claim`].
    Claim,
    /// [`PipelineStore::message_execution`].
    MessageExecution,
}

#[derive(Default)]
struct Tables {
    pipeline: BTreeMap<SectorId, ProgressRecord>,
    message_waits: HashMap<String, ChainConfirmation>,
}

/// Pipeline store held in process memory.
#[derive(Default)]
pub struct InMemoryPipelineStore {
    tables: Mutex<Tables>,
    fail_once: Mutex<HashSet<StoreOp>>,
}

impl InMemoryPipelineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one record.
    pub fn get(&self, sector: SectorId) -> Option<ProgressRecord> {
        self.tables.lock().pipeline.get(&sector).cloned()
    }

    /// Replace or insert a record as-is.
    pub fn put(&self, record: ProgressRecord) {
        self.tables.lock().pipeline.insert(record.sector, record);
    }

    /// Make the next call of `op` fail with a store error.
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_once.lock().insert(op);
    }

    fn check(&self, op: StoreOp) -> Result<(), PipelineError> {
        if self.fail_once.lock().remove(&op) {
            return Err(PipelineError::Store(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn load_active(&self) -> Result<Vec<ProgressRecord>, PipelineError> {
        self.check(StoreOp::LoadActive)?;
        Ok(self
            .tables
            .lock()
            .pipeline
            .values()
            .filter(|r| !r.after_commit_msg_success)
            .cloned()
            .collect())
    }

    async fn claim(
        &self,
        stage: PollerStage,
        sector: SectorId,
        task_id: TaskId,
    ) -> Result<u64, PipelineError> {
        self.check(StoreOp::Claim)?;
        let mut tables = self.tables.lock();
        let Some(record) = tables.pipeline.get_mut(&sector) else {
            return Ok(0);
        };
        if !stage.admits(record) {
            return Ok(0);
        }
        stage.apply(record, task_id);
        Ok(1)
    }

    async fn message_execution(
        &self,
        sector: SectorId,
        kind: MessageKind,
    ) -> Result<Option<ChainConfirmation>, PipelineError> {
        self.check(StoreOp::MessageExecution)?;
        let tables = self.tables.lock();
        let Some(cid) = tables
            .pipeline
            .get(&sector)
            .and_then(|r| r.message_cid(kind))
        else {
            return Ok(None);
        };
        Ok(tables.message_waits.get(cid).cloned())
    }

    async fn set_precommit_landed(
        &self,
        sector: SectorId,
        seed_epoch: ChainEpoch,
        tsk: &TipSetKey,
    ) -> Result<u64, PipelineError> {
        let mut tables = self.tables.lock();
        match tables.pipeline.get_mut(&sector) {
            Some(record) if record.seed_epoch.is_none() => {
                record.seed_epoch = Some(seed_epoch);
                record.precommit_msg_tsk = Some(tsk.clone());
                record.after_precommit_msg_success = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn set_commit_landed(
        &self,
        sector: SectorId,
        tsk: &TipSetKey,
    ) -> Result<u64, PipelineError> {
        let mut tables = self.tables.lock();
        match tables.pipeline.get_mut(&sector) {
            Some(record) if !record.after_commit_msg_success => {
                record.commit_msg_tsk = Some(tsk.clone());
                record.after_commit_msg_success = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_sector(
        &self,
        sector: SectorId,
        proof: RegisteredSealProof,
    ) -> Result<(), PipelineError> {
        let mut tables = self.tables.lock();
        if tables.pipeline.contains_key(&sector) {
            return Err(PipelineError::Store(format!("sector {sector} already in pipeline")));
        }
        tables
            .pipeline
            .insert(sector, ProgressRecord::new(sector, proof));
        Ok(())
    }

    async fn complete_stage(
        &self,
        sector: SectorId,
        stage: Stage,
        output: StageOutput,
    ) -> Result<u64, PipelineError> {
        let mut tables = self.tables.lock();
        let Some(record) = tables.pipeline.get_mut(&sector) else {
            return Ok(0);
        };
        let slot = record.slot_mut(stage);
        if slot.task_id.is_none() || slot.done {
            return Ok(0);
        }
        slot.done = true;

        match (stage, output) {
            (Stage::PoRep, StageOutput::Proof(proof)) => record.porep_proof = proof,
            (Stage::PrecommitMsg, StageOutput::Message(cid)) => record.precommit_msg_cid = Some(cid),
            (Stage::CommitMsg, StageOutput::Message(cid)) => record.commit_msg_cid = Some(cid),
            (_, StageOutput::Unit) => {}
            (stage, output) => {
                debug!(sector = %sector, stage = %stage, ?output, "stage output ignored");
            }
        }
        Ok(1)
    }

    async fn mark_failed(&self, sector: SectorId, reason: &str) -> Result<u64, PipelineError> {
        let mut tables = self.tables.lock();
        match tables.pipeline.get_mut(&sector) {
            Some(record) => {
                record.failed = true;
                reason.clone_into(&mut record.failed_reason);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn record_message_execution(
        &self,
        signed_cid: &str,
        outcome: ChainConfirmation,
    ) -> Result<(), PipelineError> {
        self.tables
            .lock()
            .message_waits
            .insert(signed_cid.to_owned(), outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector() -> SectorId {
        SectorId::new(1000, 1)
    }

    async fn seeded() -> InMemoryPipelineStore {
        let store = InMemoryPipelineStore::new();
        store
            .insert_sector(sector(), RegisteredSealProof::StackedDrg2KiBV1_1)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn second_claim_affects_no_rows() {
        let store = seeded().await;
        assert_eq!(store.claim(PollerStage::Sdr, sector(), 1).await.unwrap(), 1);
        assert_eq!(store.claim(PollerStage::Sdr, sector(), 2).await.unwrap(), 0);
        assert_eq!(store.get(sector()).unwrap().sdr.task_id, Some(1));
    }

    #[tokio::test]
    async fn trees_claim_requires_sdr_done() {
        let store = seeded().await;
        assert_eq!(store.claim(PollerStage::Trees, sector(), 5).await.unwrap(), 0);
        store.claim(PollerStage::Sdr, sector(), 1).await.unwrap();
        store
            .complete_stage(sector(), Stage::Sdr, StageOutput::Unit)
            .await
            .unwrap();
        assert_eq!(store.claim(PollerStage::Trees, sector(), 5).await.unwrap(), 1);
        let rec = store.get(sector()).unwrap();
        assert_eq!(
            [rec.tree_d.task_id, rec.tree_c.task_id, rec.tree_r.task_id],
            [Some(5); 3]
        );
    }

    #[tokio::test]
    async fn complete_requires_claim() {
        let store = seeded().await;
        let rows = store
            .complete_stage(sector(), Stage::Sdr, StageOutput::Unit)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn message_execution_joins_on_cid() {
        let store = seeded().await;
        assert!(store
            .message_execution(sector(), MessageKind::Precommit)
            .await
            .unwrap()
            .is_none());

        store.claim(PollerStage::Sdr, sector(), 1).await.unwrap();
        let mut rec = store.get(sector()).unwrap();
        rec.precommit_msg.task_id = Some(3);
        store.put(rec);
        store
            .complete_stage(sector(), Stage::PrecommitMsg, StageOutput::Message("bafy-pc".into()))
            .await
            .unwrap();
        let outcome = ChainConfirmation {
            executed_tsk: TipSetKey("tsk-10".into()),
            executed_epoch: 10,
            executed_msg_cid: "bafy-pc".into(),
            exit_code: 0,
            gas_used: 1,
        };
        store
            .record_message_execution("bafy-pc", outcome.clone())
            .await
            .unwrap();

        let got = store
            .message_execution(sector(), MessageKind::Precommit)
            .await
            .unwrap();
        assert_eq!(got, Some(outcome));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = seeded().await;
        store.fail_next(StoreOp::LoadActive);
        assert!(matches!(store.load_active().await, Err(PipelineError::Store(_))));
        assert_eq!(store.load_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = seeded().await;
        let err = store
            .insert_sector(sector(), RegisteredSealProof::StackedDrg2KiBV1_1)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));
    }
}
