//! # Seal Pipeline
//!
//! Crash-recoverable driver for the sector sealing pipeline of a storage
//! provider, plus the scheduler policy that spreads sealing work over workers.
//!
//! A sector passes through these stages in order: SDR, the tree group
//! (tree-d, tree-c, tree-r), the pre-commit message, a wait for the pre-commit
//! to land and its seed epoch to mature, the PoRep proof, the prove-commit
//! message, and a wait for the prove-commit to land.
//!
//! - [`core::poller::SealPoller`] re-derives every sector's readiness from
//!   persisted state on each tick and claims ready stages with conditional
//!   updates, so any number of processes can poll the same store.
//! - [`core::sched::SpreadAssigner`] places queued worker requests into
//!   capacity windows, preferring workers that received the least work in the
//!   current pass.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use seal_pipeline::config::PipelineConfig;
//! use seal_pipeline::core::{PollerStage, SealPoller};
//! use seal_pipeline::infra::{chain::InMemoryChain, store::InMemoryPipelineStore, tasks::LocalTaskEngine};
//!
//! let config = PipelineConfig::from_env()?;
//! let store = Arc::new(InMemoryPipelineStore::new());
//! let poller = SealPoller::new(store, Arc::new(InMemoryChain::new(0)), config.poller.clone());
//! poller.registry().register(PollerStage::Sdr, Arc::new(LocalTaskEngine::new("sdr")))?;
//! poller.run_poller(config.poller.interval(), shutdown).await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Configuration models for the poller, scheduler, and store backend.
pub mod config;
/// Pipeline polling, claiming, and task assignment.
pub mod core;
/// Store, chain, and task engine adapters.
pub mod infra;
/// Shared utilities.
pub mod util;
