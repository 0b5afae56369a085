//! Chain state queries consumed by the poller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::util::serde::{ActorId, ChainEpoch, SectorNumber, TipSetKey};

/// Current chain head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Head height.
    pub height: ChainEpoch,
    /// Head tipset key.
    pub key: TipSetKey,
}

/// On-chain pre-commit of a sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommitOnChainInfo {
    /// Epoch the pre-commit was accepted at.
    pub pre_commit_epoch: ChainEpoch,
    /// Deposit locked for the pre-commit, in attoFIL.
    pub pre_commit_deposit: String,
}

/// On-chain info of a proven sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorOnChainInfo {
    /// Sector number.
    pub sector_number: SectorNumber,
    /// Epoch the sector was activated at.
    pub activation: ChainEpoch,
    /// Epoch the sector expires at.
    pub expiration: ChainEpoch,
}

/// Read-only chain state used to gate and confirm pipeline stages.
#[async_trait]
pub trait ChainApi: Send + Sync + 'static {
    /// Current head.
    async fn chain_head(&self) -> Result<ChainHead, PipelineError>;

    /// Pre-commit info for a sector at head, `None` if absent
    /// (never landed, expired, or already proven).
    async fn state_sector_precommit_info(
        &self,
        miner: ActorId,
        number: SectorNumber,
    ) -> Result<Option<PreCommitOnChainInfo>, PipelineError>;

    /// Sector info at head, `None` if the sector is not on chain.
    async fn state_sector_get_info(
        &self,
        miner: ActorId,
        number: SectorNumber,
    ) -> Result<Option<SectorOnChainInfo>, PipelineError>;
}
