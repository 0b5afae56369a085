//! Pipeline store backends.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryPipelineStore, StoreOp};
#[cfg(feature = "postgres")]
pub use postgres::PostgresPipelineStore;
