//! Serializable identifier and enumeration types shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task identifier minted by the task execution service.
pub type TaskId = i64;

/// Chain height, in epochs.
pub type ChainEpoch = i64;

/// Storage provider actor id (the numeric part of an `f0` address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f0{}", self.0)
    }
}

/// Sector number within a storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorNumber(pub u64);

impl fmt::Display for SectorNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified sector identity: provider plus sector number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId {
    /// Owning storage provider.
    pub miner: ActorId,
    /// Sector number within that provider.
    pub number: SectorNumber,
}

impl SectorId {
    /// Build a sector id from raw numbers.
    pub const fn new(sp_id: u64, sector_number: u64) -> Self {
        Self {
            miner: ActorId(sp_id),
            number: SectorNumber(sector_number),
        }
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-t0{}-{}", self.miner.0, self.number.0)
    }
}

/// Opaque key of the tipset a message was executed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipSetKey(pub String);

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Worker identity inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Mint a fresh random worker id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seal proof type registered for a sector; determines sector size and resource needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisteredSealProof {
    /// 2 KiB test sectors.
    #[serde(rename = "stacked_drg_2kib_v1_1")]
    StackedDrg2KiBV1_1,
    /// 8 MiB test sectors.
    #[serde(rename = "stacked_drg_8mib_v1_1")]
    StackedDrg8MiBV1_1,
    /// 512 MiB sectors.
    #[serde(rename = "stacked_drg_512mib_v1_1")]
    StackedDrg512MiBV1_1,
    /// 32 GiB production sectors.
    #[serde(rename = "stacked_drg_32gib_v1_1")]
    StackedDrg32GiBV1_1,
    /// 64 GiB production sectors.
    #[serde(rename = "stacked_drg_64gib_v1_1")]
    StackedDrg64GiBV1_1,
}

impl RegisteredSealProof {
    /// Every supported proof.
    pub const ALL: [Self; 5] = [
        Self::StackedDrg2KiBV1_1,
        Self::StackedDrg8MiBV1_1,
        Self::StackedDrg512MiBV1_1,
        Self::StackedDrg32GiBV1_1,
        Self::StackedDrg64GiBV1_1,
    ];

    /// Sector size in bytes.
    pub const fn sector_size(self) -> u64 {
        match self {
            Self::StackedDrg2KiBV1_1 => 2 << 10,
            Self::StackedDrg8MiBV1_1 => 8 << 20,
            Self::StackedDrg512MiBV1_1 => 512 << 20,
            Self::StackedDrg32GiBV1_1 => 32 << 30,
            Self::StackedDrg64GiBV1_1 => 64 << 30,
        }
    }

    /// Stable label, as stored in the pipeline table.
    pub const fn label(self) -> &'static str {
        match self {
            Self::StackedDrg2KiBV1_1 => "stacked_drg_2kib_v1_1",
            Self::StackedDrg8MiBV1_1 => "stacked_drg_8mib_v1_1",
            Self::StackedDrg512MiBV1_1 => "stacked_drg_512mib_v1_1",
            Self::StackedDrg32GiBV1_1 => "stacked_drg_32gib_v1_1",
            Self::StackedDrg64GiBV1_1 => "stacked_drg_64gib_v1_1",
        }
    }
}

impl fmt::Display for RegisteredSealProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for RegisteredSealProof {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.label() == s)
            .ok_or_else(|| format!("unknown seal proof: {s}"))
    }
}

/// Kind of sealing work a scheduler request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Write deal data into an unsealed sector.
    AddPiece,
    /// SDR layer encoding.
    PreCommit1,
    /// Tree building (tree-d, tree-c, tree-r).
    PreCommit2,
    /// Commit phase 1 (vanilla proofs).
    Commit1,
    /// Commit phase 2 (SNARK).
    Commit2,
    /// Drop cache files after commit.
    Finalize,
    /// Move sector files between storage paths.
    Fetch,
}

impl TaskType {
    /// Short label used in logs.
    pub const fn short(self) -> &'static str {
        match self {
            Self::AddPiece => "AP",
            Self::PreCommit1 => "PC1",
            Self::PreCommit2 => "PC2",
            Self::Commit1 => "C1",
            Self::Commit2 => "C2",
            Self::Finalize => "FIN",
            Self::Fetch => "GET",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}
