//! Task-to-worker assignment.
//!
//! The scheduler keeps a FIFO [`RequestQueue`] of pending requests and a set
//! of open [`SchedWindow`]s, each a slot of capacity on one worker. An
//! [`Assigner`] moves requests from the queue into windows.

pub mod resources;
pub mod spread;
pub mod window;

pub use resources::{ActiveResources, Resources, WorkerInfo, WorkerResources};
pub use spread::{acceptable_windows, assigner_for, spread_ws, Assigner, SchedState, SpreadAssigner};
pub use window::{RequestQueue, SchedWindow, WorkerHandle, WorkerRequest};
