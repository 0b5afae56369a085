//! Sealing pipeline poller.
//!
//! Every tick the poller reloads all unfinished [`ProgressRecord`]s and
//! re-derives, from persisted facts alone, which stages are ready. Nothing is
//! cached between ticks, so a restarted process (or a second process polling
//! the same store) picks up exactly where the pipeline stands.
//!
//! Ready stages are claimed through the deferred registration handle of that
//! stage: the task execution service mints a task id and the poller's claim
//! callback writes it with a conditional update that must affect exactly one
//! row. Two pollers racing for the same stage therefore produce one task.
//!
//! Landing checks are not claims. They join the submitted message against the
//! message wait table, confirm the result against chain state, and update the
//! record directly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::chain::{ChainApi, ChainHead};
use crate::core::claim::PollerStage;
use crate::core::promise::Promise;
use crate::core::record::{MessageKind, ProgressRecord};
use crate::core::registration::{AddTaskHandle, ClaimFn, ClaimFuture};
use crate::core::store::PipelineStore;
use crate::core::PipelineError;
use crate::util::serde::{ChainEpoch, TaskId};

/// Default interval between ticks.
pub const SEAL_POLLER_INTERVAL: Duration = Duration::from_secs(10);

/// Epochs the chain must advance past the seed epoch before PoRep starts.
pub const SEED_EPOCH_CONFIDENCE: ChainEpoch = 3;

/// Network pre-commit challenge delay, in epochs.
pub const PRECOMMIT_CHALLENGE_DELAY: ChainEpoch = 150;

/// Registration slots, one settable-once handle per claimable stage.
///
/// The task execution service fills a slot when it is ready to accept that
/// stage's tasks. The poller only ever peeks; an empty slot means the stage is
/// skipped for the tick.
#[derive(Debug)]
pub struct PollerRegistry {
    slots: [Promise<AddTaskHandle>; PollerStage::COUNT],
}

impl PollerRegistry {
    /// Create a registry with every slot empty.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Promise::new()),
        }
    }

    /// Install the handle for a stage. Each slot can be set once.
    pub fn register(&self, stage: PollerStage, handle: AddTaskHandle) -> Result<(), PipelineError> {
        self.slots[stage.index()]
            .set(handle)
            .map_err(|_| PipelineError::Registration(format!("{stage} handle already registered")))?;
        info!(stage = %stage, "task registration handle installed");
        Ok(())
    }

    /// Handle of a stage, if registered.
    pub fn handle(&self, stage: PollerStage) -> Option<&AddTaskHandle> {
        self.slots[stage.index()].get()
    }

    /// Whether a stage has a handle.
    pub fn is_registered(&self, stage: PollerStage) -> bool {
        self.slots[stage.index()].is_set()
    }
}

impl Default for PollerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness checks, evaluated in this order for every active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStep {
    /// Claim SDR.
    StartSdr,
    /// Claim the tree group.
    StartTrees,
    /// Claim the pre-commit message.
    StartPrecommitMsg,
    /// Check whether the pre-commit landed.
    PrecommitMsgLanded,
    /// Claim PoRep once the seed epoch is deep enough.
    StartPoRep,
    /// Claim the prove-commit message.
    StartCommitMsg,
    /// Check whether the prove-commit landed.
    CommitMsgLanded,
}

impl PollStep {
    /// Evaluation order.
    pub const ORDER: [Self; 7] = [
        Self::StartSdr,
        Self::StartTrees,
        Self::StartPrecommitMsg,
        Self::PrecommitMsgLanded,
        Self::StartPoRep,
        Self::StartCommitMsg,
        Self::CommitMsgLanded,
    ];

    /// Stage claimed by this step, `None` for landing checks.
    pub const fn claims(self) -> Option<PollerStage> {
        match self {
            Self::StartSdr => Some(PollerStage::Sdr),
            Self::StartTrees => Some(PollerStage::Trees),
            Self::StartPrecommitMsg => Some(PollerStage::PrecommitMsg),
            Self::StartPoRep => Some(PollerStage::PoRep),
            Self::StartCommitMsg => Some(PollerStage::CommitMsg),
            Self::PrecommitMsgLanded | Self::CommitMsgLanded => None,
        }
    }

    /// Whether the step should run for `record` at chain height `head`.
    ///
    /// Claim steps additionally require a registered handle; that check is
    /// made by the caller, so this predicate depends on the record and the
    /// chain height only.
    pub fn is_ready(self, record: &ProgressRecord, head: ChainEpoch, config: &PollerConfig) -> bool {
        match self {
            Self::StartSdr | Self::StartTrees | Self::StartPrecommitMsg => self
                .claims()
                .is_some_and(|stage| stage.admits(record)),
            Self::PrecommitMsgLanded => {
                record.precommit_msg.task_id.is_some() && !record.after_precommit_msg_success
            }
            Self::StartPoRep => {
                record.after_precommit_msg_success
                    && record.porep.is_unclaimed()
                    && record
                        .seed_epoch
                        .is_some_and(|seed| head >= seed.saturating_add(config.seed_epoch_confidence))
            }
            Self::StartCommitMsg => {
                record.porep.done
                    && !record.porep_proof.is_empty()
                    && record.commit_msg.is_unclaimed()
            }
            Self::CommitMsgLanded => record.commit_msg.done && !record.after_commit_msg_success,
        }
    }
}

/// Outcome counters of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Records loaded.
    pub records: usize,
    /// Records skipped because they are failed.
    pub skipped_failed: usize,
    /// Stages claimed.
    pub claimed: usize,
    /// Messages confirmed landed.
    pub landed: usize,
    /// Messages executed whose on-chain state is missing.
    pub unresolved: usize,
    /// Step errors logged and skipped.
    pub errors: usize,
}

/// Drives the sealing pipeline forward from persisted state.
pub struct SealPoller<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    registry: Arc<PollerRegistry>,
    config: PollerConfig,
    audit: Option<Arc<Mutex<dyn AuditSink>>>,
}

impl<S, C> SealPoller<S, C>
where
    S: PipelineStore,
    C: ChainApi,
{
    /// Create a poller with an empty registry.
    pub fn new(store: Arc<S>, chain: Arc<C>, config: PollerConfig) -> Self {
        Self {
            store,
            chain,
            registry: Arc::new(PollerRegistry::new()),
            config,
            audit: None,
        }
    }

    /// Share an existing registry (e.g. one the task engine already holds).
    pub fn with_registry(mut self, registry: Arc<PollerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Attach a shared audit sink.
    pub fn with_audit(mut self, audit: Arc<Mutex<dyn AuditSink>>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Registration slots, for the task execution service to fill.
    pub const fn registry(&self) -> &Arc<PollerRegistry> {
        &self.registry
    }

    /// Poller settings.
    pub const fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Tick every `tick_interval` until `shutdown` is cancelled.
    ///
    /// Tick errors are logged and retried on the next tick. Cancellation is
    /// observed between ticks; a running tick completes first. A slow tick
    /// delays the next one instead of queueing extra ticks.
    #[cfg(feature = "tokio-runtime")]
    pub async fn run_poller(
        &self,
        tick_interval: Duration,
        shutdown: tokio_util::sync::CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + tick_interval,
            tick_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("seal poller shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        error!(error = %err, "polling failed");
                    }
                }
            }
        }
    }

    /// Run one tick over every active record.
    ///
    /// Load and chain head failures, and any store failure during a step,
    /// abort the tick. Other step failures are logged and counted, and the
    /// remaining steps and records still run.
    pub async fn poll_once(&self) -> Result<PollReport, PipelineError> {
        let records = self.store.load_active().await?;
        let head = self.chain.chain_head().await?;

        let mut report = PollReport {
            records: records.len(),
            ..PollReport::default()
        };

        for record in &records {
            if record.failed {
                report.skipped_failed += 1;
                continue;
            }
            if record.is_terminal() {
                continue;
            }

            for step in PollStep::ORDER {
                match self.run_step(step, record, &head, &mut report).await {
                    Ok(()) => {}
                    Err(err @ PipelineError::Store(_)) => {
                        error!(
                            sp_id = record.sector.miner.0,
                            sector = record.sector.number.0,
                            step = ?step,
                            error = %err,
                            "store error, aborting tick"
                        );
                        return Err(err);
                    }
                    Err(err) => {
                        report.errors += 1;
                        self.on_step_error(step, record, &err);
                    }
                }
            }
        }

        debug!(
            records = report.records,
            claimed = report.claimed,
            landed = report.landed,
            unresolved = report.unresolved,
            errors = report.errors,
            head = head.height,
            "poll tick complete"
        );
        Ok(report)
    }

    async fn run_step(
        &self,
        step: PollStep,
        record: &ProgressRecord,
        head: &ChainHead,
        report: &mut PollReport,
    ) -> Result<(), PipelineError> {
        if let Some(stage) = step.claims() {
            if !self.registry.is_registered(stage) {
                return Ok(());
            }
        }
        if !step.is_ready(record, head.height, &self.config) {
            return Ok(());
        }

        match step {
            PollStep::PrecommitMsgLanded => self.poll_precommit_landed(record, report).await,
            PollStep::CommitMsgLanded => self.poll_commit_landed(record, report).await,
            _ => match step.claims() {
                Some(stage) => self.start_stage(stage, record, report).await,
                None => Ok(()),
            },
        }
    }

    async fn start_stage(
        &self,
        stage: PollerStage,
        record: &ProgressRecord,
        report: &mut PollReport,
    ) -> Result<(), PipelineError> {
        let Some(handle) = self.registry.handle(stage) else {
            return Ok(());
        };

        let store = Arc::clone(&self.store);
        let sector = record.sector;
        let claim: ClaimFn = Box::new(move |task_id: TaskId| -> ClaimFuture {
            Box::pin(async move {
                let affected = store.claim(stage, sector, task_id).await?;
                if affected != 1 {
                    return Err(PipelineError::ClaimConflict {
                        stage,
                        sp_id: sector.miner.0,
                        sector_number: sector.number.0,
                        affected,
                    });
                }
                Ok::<bool, PipelineError>(true)
            })
        });

        match handle.add_task(claim).await? {
            Some(task_id) => {
                info!(
                    sp_id = sector.miner.0,
                    sector = sector.number.0,
                    stage = %stage,
                    task_id,
                    "stage claimed"
                );
                report.claimed += 1;
                self.record_audit(record, stage.to_string(), AuditAction::Claim, Some(task_id), None);
            }
            None => {
                debug!(sp_id = sector.miner.0, sector = sector.number.0, stage = %stage, "claim declined");
            }
        }
        Ok(())
    }

    async fn poll_precommit_landed(
        &self,
        record: &ProgressRecord,
        report: &mut PollReport,
    ) -> Result<(), PipelineError> {
        let sector = record.sector;
        let Some(exec) = self
            .store
            .message_execution(sector, MessageKind::Precommit)
            .await?
        else {
            return Ok(());
        };

        let pci = self
            .chain
            .state_sector_precommit_info(sector.miner, sector.number)
            .await?;

        let Some(pci) = pci else {
            // Expired or superseded pre-commit. No recovery policy yet; the
            // record stays here until an operator intervenes.
            warn!(
                sp_id = sector.miner.0,
                sector = sector.number.0,
                exec_epoch = exec.executed_epoch,
                exec_tsk = %exec.executed_tsk,
                msg_cid = %exec.executed_msg_cid,
                "pre-commit executed but no on-chain pre-commit info"
            );
            report.unresolved += 1;
            self.record_audit(
                record,
                MessageKind::Precommit.to_string(),
                AuditAction::LandingUnresolved,
                None,
                Some(exec.executed_msg_cid),
            );
            return Ok(());
        };

        let seed_epoch = pci
            .pre_commit_epoch
            .saturating_add(self.config.precommit_challenge_delay);
        let affected = self
            .store
            .set_precommit_landed(sector, seed_epoch, &exec.executed_tsk)
            .await?;
        if affected == 0 {
            debug!(sp_id = sector.miner.0, sector = sector.number.0, "pre-commit landing already recorded");
            return Ok(());
        }

        info!(
            sp_id = sector.miner.0,
            sector = sector.number.0,
            precommit_epoch = pci.pre_commit_epoch,
            seed_epoch,
            "pre-commit landed"
        );
        report.landed += 1;
        self.record_audit(
            record,
            MessageKind::Precommit.to_string(),
            AuditAction::Landed,
            None,
            Some(format!("seed_epoch={seed_epoch}")),
        );
        Ok(())
    }

    async fn poll_commit_landed(
        &self,
        record: &ProgressRecord,
        report: &mut PollReport,
    ) -> Result<(), PipelineError> {
        let sector = record.sector;
        let Some(exec) = self
            .store
            .message_execution(sector, MessageKind::Commit)
            .await?
        else {
            return Ok(());
        };

        let info = self
            .chain
            .state_sector_get_info(sector.miner, sector.number)
            .await?;

        if info.is_none() {
            // TODO: decide between retrying the prove-commit and failing the record.
            error!(
                sp_id = sector.miner.0,
                sector = sector.number.0,
                exec_epoch = exec.executed_epoch,
                exec_tsk = %exec.executed_tsk,
                msg_cid = %exec.executed_msg_cid,
                "prove-commit executed but sector not found on chain"
            );
            report.unresolved += 1;
            self.record_audit(
                record,
                MessageKind::Commit.to_string(),
                AuditAction::LandingUnresolved,
                None,
                Some(exec.executed_msg_cid),
            );
            return Ok(());
        }

        let affected = self
            .store
            .set_commit_landed(sector, &exec.executed_tsk)
            .await?;
        if affected == 0 {
            debug!(sp_id = sector.miner.0, sector = sector.number.0, "prove-commit landing already recorded");
            return Ok(());
        }

        info!(sp_id = sector.miner.0, sector = sector.number.0, "sector sealed and on chain");
        report.landed += 1;
        self.record_audit(record, MessageKind::Commit.to_string(), AuditAction::Landed, None, None);
        Ok(())
    }

    fn on_step_error(&self, step: PollStep, record: &ProgressRecord, err: &PipelineError) {
        if err.is_invariant_violation() {
            error!(
                sp_id = record.sector.miner.0,
                sector = record.sector.number.0,
                step = ?step,
                error = %err,
                "claim invariant violated; claim abandoned for this tick"
            );
            let stage = step.claims().map_or_else(|| format!("{step:?}"), |s| s.to_string());
            self.record_audit(record, stage, AuditAction::ClaimConflict, None, Some(err.to_string()));
        } else {
            error!(
                sp_id = record.sector.miner.0,
                sector = record.sector.number.0,
                step = ?step,
                error = %err,
                "poller operation failed"
            );
        }
    }

    fn record_audit(
        &self,
        record: &ProgressRecord,
        stage: String,
        action: AuditAction,
        task_id: Option<TaskId>,
        detail: Option<String>,
    ) {
        if let Some(audit_sink) = &self.audit {
            audit_sink
                .lock()
                .record(build_audit_event(record.sector, stage, action, task_id, detail));
        }
    }
}
