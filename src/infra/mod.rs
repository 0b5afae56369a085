//! Infrastructure adapters for the pipeline store, chain, and task engine.

pub mod chain;
pub mod store;
pub mod tasks;

pub use chain::InMemoryChain;
pub use store::InMemoryPipelineStore;
pub use tasks::LocalTaskEngine;
