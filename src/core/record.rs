//! Persisted per-sector progress records and the pipeline table schema.
//!
//! A [`ProgressRecord`] mirrors one row of `sectors_sdr_pipeline`. Each
//! [`Stage`] owns a [`StageSlot`]: the task id that claimed it (set at most
//! once) and whether that task finished. Message stages additionally carry the
//! signed message cid, and the landing checks record the epoch and tipset the
//! message executed in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::serde::{ChainEpoch, RegisteredSealProof, SectorId, TaskId, TipSetKey};

/// Pipeline table name.
pub const SDR_PIPELINE_TABLE: &str = "sectors_sdr_pipeline";

/// Message execution side table name.
pub const MESSAGE_WAITS_TABLE: &str = "message_waits";

/// One step of the sealing pipeline that owns a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stacked DRG layer encoding.
    Sdr,
    /// Data tree.
    TreeD,
    /// Column commitment tree.
    TreeC,
    /// Replica tree.
    TreeR,
    /// Pre-commit message submission.
    PrecommitMsg,
    /// Replication proof computation.
    PoRep,
    /// Prove-commit message submission.
    CommitMsg,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Sdr,
        Self::TreeD,
        Self::TreeC,
        Self::TreeR,
        Self::PrecommitMsg,
        Self::PoRep,
        Self::CommitMsg,
    ];

    /// Column holding the claiming task id.
    pub const fn task_column(self) -> &'static str {
        match self {
            Self::Sdr => "task_id_sdr",
            Self::TreeD => "task_id_tree_d",
            Self::TreeC => "task_id_tree_c",
            Self::TreeR => "task_id_tree_r",
            Self::PrecommitMsg => "task_id_precommit_msg",
            Self::PoRep => "task_id_porep",
            Self::CommitMsg => "task_id_commit_msg",
        }
    }

    /// Column holding the completion flag.
    pub const fn done_column(self) -> &'static str {
        match self {
            Self::Sdr => "after_sdr",
            Self::TreeD => "after_tree_d",
            Self::TreeC => "after_tree_c",
            Self::TreeR => "after_tree_r",
            Self::PrecommitMsg => "after_precommit_msg",
            Self::PoRep => "after_porep",
            Self::CommitMsg => "after_commit_msg",
        }
    }

    /// Column receiving `output` when this stage completes, if the output
    /// belongs to the stage.
    pub const fn output_column(self, output: &StageOutput) -> Option<&'static str> {
        match (self, output) {
            (Self::PoRep, StageOutput::Proof(_)) => Some("porep_proof"),
            (Self::PrecommitMsg, StageOutput::Message(_)) => Some(MessageKind::Precommit.cid_column()),
            (Self::CommitMsg, StageOutput::Message(_)) => Some(MessageKind::Commit.cid_column()),
            _ => None,
        }
    }

    /// Completion update. Applies only to a claimed, unfinished stage.
    /// `$1` is the provider id, `$2` the sector number and `$3` the output
    /// when `output_column` is set.
    pub fn complete_sql(self, output_column: Option<&str>) -> String {
        let done = self.done_column();
        let set = output_column.map_or_else(
            || format!("{done} = TRUE"),
            |column| format!("{done} = TRUE, {column} = $3"),
        );
        format!(
            "UPDATE {SDR_PIPELINE_TABLE} SET {set} \
             WHERE sp_id = $1 AND sector_number = $2 AND {} IS NOT NULL AND {done} = FALSE",
            self.task_column()
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sdr => "sdr",
            Self::TreeD => "tree_d",
            Self::TreeC => "tree_c",
            Self::TreeR => "tree_r",
            Self::PrecommitMsg => "precommit_msg",
            Self::PoRep => "porep",
            Self::CommitMsg => "commit_msg",
        };
        f.write_str(name)
    }
}

/// Task slot of one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSlot {
    /// Task that claimed the stage. Set at most once.
    pub task_id: Option<TaskId>,
    /// Whether the claiming task finished.
    pub done: bool,
}

impl StageSlot {
    /// True when no task has claimed this slot.
    pub const fn is_unclaimed(&self) -> bool {
        self.task_id.is_none()
    }
}

/// On-chain message submitted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Sector pre-commit (message A).
    Precommit,
    /// Sector prove-commit (message B).
    Commit,
}

impl MessageKind {
    /// Column of the pipeline table holding the signed message cid.
    pub const fn cid_column(self) -> &'static str {
        match self {
            Self::Precommit => "precommit_msg_cid",
            Self::Commit => "commit_msg_cid",
        }
    }

    /// Landing update, written only while the landing is unrecorded.
    ///
    /// Pre-commit binds `$1` seed epoch, `$2` tipset key, `$3` provider id and
    /// `$4` sector number. Prove-commit binds `$1` tipset key, `$2` provider id
    /// and `$3` sector number.
    pub fn landing_sql(self) -> String {
        match self {
            Self::Precommit => format!(
                "UPDATE {SDR_PIPELINE_TABLE} SET seed_epoch = $1, precommit_msg_tsk = $2, \
                 after_precommit_msg_success = TRUE \
                 WHERE sp_id = $3 AND sector_number = $4 AND seed_epoch IS NULL"
            ),
            Self::Commit => format!(
                "UPDATE {SDR_PIPELINE_TABLE} SET commit_msg_tsk = $1, after_commit_msg_success = TRUE \
                 WHERE sp_id = $2 AND sector_number = $3 AND after_commit_msg_success = FALSE"
            ),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precommit => f.write_str("precommit"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// Execution outcome of a submitted message, as indexed from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfirmation {
    /// Tipset the message was executed in.
    pub executed_tsk: TipSetKey,
    /// Epoch of that tipset.
    pub executed_epoch: ChainEpoch,
    /// Cid of the executed message.
    pub executed_msg_cid: String,
    /// Receipt exit code.
    pub exit_code: i64,
    /// Receipt gas used.
    pub gas_used: i64,
}

/// Output a finished stage hands back to its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Nothing beyond the completion flag.
    Unit,
    /// Replication proof bytes (PoRep stage).
    Proof(Vec<u8>),
    /// Cid of the signed message that was pushed (message stages).
    Message(String),
}

/// Progress of one sector through the sealing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Provider and sector number.
    pub sector: SectorId,
    /// Seal proof type of the sector.
    pub reg_seal_proof: RegisteredSealProof,

    /// SDR slot.
    pub sdr: StageSlot,
    /// Tree-D slot.
    pub tree_d: StageSlot,
    /// Tree-C slot.
    pub tree_c: StageSlot,
    /// Tree-R slot.
    pub tree_r: StageSlot,

    /// Pre-commit message slot.
    pub precommit_msg: StageSlot,
    /// Signed pre-commit message cid, once pushed.
    pub precommit_msg_cid: Option<String>,
    /// Pre-commit landed and on-chain pre-commit info was found.
    pub after_precommit_msg_success: bool,
    /// Interactive randomness epoch derived from the pre-commit epoch.
    pub seed_epoch: Option<ChainEpoch>,
    /// Tipset the pre-commit executed in.
    pub precommit_msg_tsk: Option<TipSetKey>,

    /// PoRep slot.
    pub porep: StageSlot,
    /// Replication proof produced by the PoRep stage.
    pub porep_proof: Vec<u8>,

    /// Prove-commit message slot.
    pub commit_msg: StageSlot,
    /// Signed prove-commit message cid, once pushed.
    pub commit_msg_cid: Option<String>,
    /// Prove-commit landed and the sector is on chain. Terminal.
    pub after_commit_msg_success: bool,
    /// Tipset the prove-commit executed in.
    pub commit_msg_tsk: Option<TipSetKey>,

    /// Record-level failure; excludes the record from polling.
    pub failed: bool,
    /// Operator-facing failure reason.
    pub failed_reason: String,
}

impl ProgressRecord {
    /// A record for a sector that just entered the pipeline.
    pub fn new(sector: SectorId, reg_seal_proof: RegisteredSealProof) -> Self {
        Self {
            sector,
            reg_seal_proof,
            sdr: StageSlot::default(),
            tree_d: StageSlot::default(),
            tree_c: StageSlot::default(),
            tree_r: StageSlot::default(),
            precommit_msg: StageSlot::default(),
            precommit_msg_cid: None,
            after_precommit_msg_success: false,
            seed_epoch: None,
            precommit_msg_tsk: None,
            porep: StageSlot::default(),
            porep_proof: Vec::new(),
            commit_msg: StageSlot::default(),
            commit_msg_cid: None,
            after_commit_msg_success: false,
            commit_msg_tsk: None,
            failed: false,
            failed_reason: String::new(),
        }
    }

    /// Slot of a stage.
    pub const fn slot(&self, stage: Stage) -> &StageSlot {
        match stage {
            Stage::Sdr => &self.sdr,
            Stage::TreeD => &self.tree_d,
            Stage::TreeC => &self.tree_c,
            Stage::TreeR => &self.tree_r,
            Stage::PrecommitMsg => &self.precommit_msg,
            Stage::PoRep => &self.porep,
            Stage::CommitMsg => &self.commit_msg,
        }
    }

    /// Mutable slot of a stage.
    pub fn slot_mut(&mut self, stage: Stage) -> &mut StageSlot {
        match stage {
            Stage::Sdr => &mut self.sdr,
            Stage::TreeD => &mut self.tree_d,
            Stage::TreeC => &mut self.tree_c,
            Stage::TreeR => &mut self.tree_r,
            Stage::PrecommitMsg => &mut self.precommit_msg,
            Stage::PoRep => &mut self.porep,
            Stage::CommitMsg => &mut self.commit_msg,
        }
    }

    /// Cid of a submitted message, if pushed.
    pub fn message_cid(&self, kind: MessageKind) -> Option<&str> {
        match kind {
            MessageKind::Precommit => self.precommit_msg_cid.as_deref(),
            MessageKind::Commit => self.commit_msg_cid.as_deref(),
        }
    }

    /// True once the prove-commit landed; such records are no longer polled.
    pub const fn is_terminal(&self) -> bool {
        self.after_commit_msg_success
    }
}

/// Migration statements for the pipeline tables.
pub fn migrations() -> &'static [&'static str] {
    &[
        r"
CREATE TABLE IF NOT EXISTS sectors_sdr_pipeline (
    sp_id BIGINT NOT NULL,
    sector_number BIGINT NOT NULL,
    reg_seal_proof TEXT NOT NULL,

    task_id_sdr BIGINT,
    after_sdr BOOLEAN NOT NULL DEFAULT FALSE,
    task_id_tree_d BIGINT,
    after_tree_d BOOLEAN NOT NULL DEFAULT FALSE,
    task_id_tree_c BIGINT,
    after_tree_c BOOLEAN NOT NULL DEFAULT FALSE,
    task_id_tree_r BIGINT,
    after_tree_r BOOLEAN NOT NULL DEFAULT FALSE,

    task_id_precommit_msg BIGINT,
    after_precommit_msg BOOLEAN NOT NULL DEFAULT FALSE,
    precommit_msg_cid TEXT,
    after_precommit_msg_success BOOLEAN NOT NULL DEFAULT FALSE,
    seed_epoch BIGINT,
    precommit_msg_tsk TEXT,

    task_id_porep BIGINT,
    porep_proof BYTEA,
    after_porep BOOLEAN NOT NULL DEFAULT FALSE,

    task_id_commit_msg BIGINT,
    after_commit_msg BOOLEAN NOT NULL DEFAULT FALSE,
    commit_msg_cid TEXT,
    after_commit_msg_success BOOLEAN NOT NULL DEFAULT FALSE,
    commit_msg_tsk TEXT,

    failed BOOLEAN NOT NULL DEFAULT FALSE,
    failed_reason TEXT NOT NULL DEFAULT '',

    PRIMARY KEY (sp_id, sector_number)
);
CREATE INDEX IF NOT EXISTS idx_sectors_sdr_pipeline_active
    ON sectors_sdr_pipeline (after_commit_msg_success) WHERE after_commit_msg_success = FALSE;
",
        r"
CREATE TABLE IF NOT EXISTS message_waits (
    signed_message_cid TEXT PRIMARY KEY,
    executed_tsk_cid TEXT,
    executed_tsk_epoch BIGINT,
    executed_msg_cid TEXT,
    executed_rcpt_exitcode BIGINT,
    executed_rcpt_gas_used BIGINT
);
",
    ]
}
