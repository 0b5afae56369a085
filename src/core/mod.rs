//! Pipeline polling, claiming, and task assignment.

pub mod audit;
pub mod chain;
pub mod claim;
pub mod error;
pub mod poller;
pub mod promise;
pub mod record;
pub mod registration;
pub mod sched;
pub mod store;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use chain::{ChainApi, ChainHead, PreCommitOnChainInfo, SectorOnChainInfo};
pub use claim::PollerStage;
pub use error::{AppResult, PipelineError};
pub use poller::{PollReport, PollStep, PollerRegistry, SealPoller};
pub use promise::Promise;
pub use record::{ChainConfirmation, MessageKind, ProgressRecord, Stage, StageOutput, StageSlot};
pub use registration::{AddTask, AddTaskHandle, ClaimFn, ClaimFuture};
pub use store::PipelineStore;
