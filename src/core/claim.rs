//! Stage claims as first-class conditional updates.
//!
//! A claim writes a freshly minted task id into one or more task columns of a
//! single pipeline row, only if those columns are still NULL, the row is not
//! failed, and the stated precondition flags hold. Every backend evaluates the same definition:
//! [`PollerStage::update_sql`] for SQL stores, [`PollerStage::admits`] plus
//! [`PollerStage::apply`] for in-memory ones. The caller requires exactly one
//! affected row.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::record::{ProgressRecord, Stage, SDR_PIPELINE_TABLE};
use crate::util::serde::TaskId;

/// A claimable unit of pipeline work, with its own registration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerStage {
    /// SDR encoding.
    Sdr,
    /// Tree-D, tree-C and tree-R, claimed together under one task.
    Trees,
    /// Pre-commit message.
    PrecommitMsg,
    /// PoRep computation.
    PoRep,
    /// Prove-commit message.
    CommitMsg,
}

impl PollerStage {
    /// Number of registration slots.
    pub const COUNT: usize = 5;

    /// All claimable stages in pipeline order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Sdr,
        Self::Trees,
        Self::PrecommitMsg,
        Self::PoRep,
        Self::CommitMsg,
    ];

    /// Index of the registration slot.
    pub const fn index(self) -> usize {
        match self {
            Self::Sdr => 0,
            Self::Trees => 1,
            Self::PrecommitMsg => 2,
            Self::PoRep => 3,
            Self::CommitMsg => 4,
        }
    }

    /// Stage slots that receive the task id.
    pub const fn stages(self) -> &'static [Stage] {
        match self {
            Self::Sdr => &[Stage::Sdr],
            Self::Trees => &[Stage::TreeD, Stage::TreeC, Stage::TreeR],
            Self::PrecommitMsg => &[Stage::PrecommitMsg],
            Self::PoRep => &[Stage::PoRep],
            Self::CommitMsg => &[Stage::CommitMsg],
        }
    }

    /// Stages whose completion flag must be true for the update to apply.
    pub const fn preconditions(self) -> &'static [Stage] {
        match self {
            Self::Trees => &[Stage::Sdr],
            Self::PrecommitMsg => &[Stage::TreeR, Stage::TreeD],
            Self::Sdr | Self::PoRep | Self::CommitMsg => &[],
        }
    }

    /// Conditional update statement. `$1` is the task id, `$2` the provider
    /// id and `$3` the sector number.
    pub fn update_sql(self) -> String {
        let set = self
            .stages()
            .iter()
            .map(|s| format!("{} = $1", s.task_column()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut conditions = vec![
            "sp_id = $2".to_string(),
            "sector_number = $3".to_string(),
            "failed = FALSE".to_string(),
        ];
        conditions.extend(
            self.preconditions()
                .iter()
                .map(|s| format!("{} = TRUE", s.done_column())),
        );
        conditions.extend(
            self.stages()
                .iter()
                .map(|s| format!("{} IS NULL", s.task_column())),
        );
        format!(
            "UPDATE {SDR_PIPELINE_TABLE} SET {set} WHERE {}",
            conditions.join(" AND ")
        )
    }

    /// Whether the conditional update's WHERE clause holds for a record.
    pub fn admits(self, record: &ProgressRecord) -> bool {
        !record.failed
            && self.preconditions().iter().all(|s| record.slot(*s).done)
            && self.stages().iter().all(|s| record.slot(*s).is_unclaimed())
    }

    /// Write the task id into every target slot.
    pub fn apply(self, record: &mut ProgressRecord, task_id: TaskId) {
        for stage in self.stages() {
            record.slot_mut(*stage).task_id = Some(task_id);
        }
    }
}

impl fmt::Display for PollerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sdr => "sdr",
            Self::Trees => "trees",
            Self::PrecommitMsg => "precommit_msg",
            Self::PoRep => "porep",
            Self::CommitMsg => "commit_msg",
        };
        f.write_str(name)
    }
}
