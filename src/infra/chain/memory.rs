//! Scriptable in-memory chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::chain::{ChainApi, ChainHead, PreCommitOnChainInfo, SectorOnChainInfo};
use crate::core::PipelineError;
use crate::util::serde::{ActorId, ChainEpoch, SectorId, SectorNumber, TipSetKey};

/// Chain state set directly by the caller.
pub struct InMemoryChain {
    head: Mutex<ChainEpoch>,
    precommits: Mutex<HashMap<SectorId, PreCommitOnChainInfo>>,
    sectors: Mutex<HashMap<SectorId, SectorOnChainInfo>>,
    fail_head: AtomicBool,
}

impl InMemoryChain {
    /// Chain with its head at `height`.
    pub fn new(height: ChainEpoch) -> Self {
        Self {
            head: Mutex::new(height),
            precommits: Mutex::new(HashMap::new()),
            sectors: Mutex::new(HashMap::new()),
            fail_head: AtomicBool::new(false),
        }
    }

    /// Tipset key used for a height.
    pub fn tipset_key(height: ChainEpoch) -> TipSetKey {
        TipSetKey(format!("tsk-{height}"))
    }

    /// Move the head.
    pub fn set_height(&self, height: ChainEpoch) {
        *self.head.lock() = height;
    }

    /// Current head height.
    pub fn height(&self) -> ChainEpoch {
        *self.head.lock()
    }

    /// Put a pre-commit on chain.
    pub fn put_precommit(&self, sector: SectorId, pre_commit_epoch: ChainEpoch) {
        self.precommits.lock().insert(
            sector,
            PreCommitOnChainInfo {
                pre_commit_epoch,
                pre_commit_deposit: "0".into(),
            },
        );
    }

    /// Drop a pre-commit, as expiry or proving would.
    pub fn remove_precommit(&self, sector: SectorId) {
        self.precommits.lock().remove(&sector);
    }

    /// Activate a sector.
    pub fn put_sector(&self, sector: SectorId, activation: ChainEpoch) {
        self.sectors.lock().insert(
            sector,
            SectorOnChainInfo {
                sector_number: sector.number,
                activation,
                expiration: activation + 540 * 2880,
            },
        );
    }

    /// Make the next head query fail.
    pub fn fail_next_head(&self) {
        self.fail_head.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainApi for InMemoryChain {
    async fn chain_head(&self) -> Result<ChainHead, PipelineError> {
        if self.fail_head.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::Chain("chain head unavailable".into()));
        }
        let height = self.height();
        Ok(ChainHead {
            height,
            key: Self::tipset_key(height),
        })
    }

    async fn state_sector_precommit_info(
        &self,
        miner: ActorId,
        number: SectorNumber,
    ) -> Result<Option<PreCommitOnChainInfo>, PipelineError> {
        let sector = SectorId { miner, number };
        Ok(self.precommits.lock().get(&sector).cloned())
    }

    async fn state_sector_get_info(
        &self,
        miner: ActorId,
        number: SectorNumber,
    ) -> Result<Option<SectorOnChainInfo>, PipelineError> {
        let sector = SectorId { miner, number };
        Ok(self.sectors.lock().get(&sector).cloned())
    }
}
