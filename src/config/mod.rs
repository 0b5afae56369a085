//! Configuration models for the poller, the scheduler and the state store.

pub mod pipeline;

pub use pipeline::{AssignerKind, PipelineConfig, PollerConfig, SchedulerConfig, StoreBackendConfig};
