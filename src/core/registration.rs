//! Deferred task registration.
//!
//! The task execution service hands the poller one [`AddTask`] handle per
//! claimable stage once it is ready to accept work. Registering a task is two
//! phase: the service mints an id, then calls the poller's [`ClaimFn`] with it.
//! The claim function performs the conditional record update and answers
//! whether the registration should persist. On `Ok(false)` or `Err` the service
//! rolls the registration back and the id is never scheduled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::util::serde::TaskId;

/// Future returned by a claim function: `Ok(true)` commits the registration.
pub type ClaimFuture = Pin<Box<dyn Future<Output = Result<bool, PipelineError>> + Send + 'static>>;

/// Claim callback invoked with the newly minted task id.
pub type ClaimFn = Box<dyn FnOnce(TaskId) -> ClaimFuture + Send + 'static>;

/// Registration handle supplied by the task execution service.
#[async_trait]
pub trait AddTask: Send + Sync {
    /// Mint a task id, run `claim` with it, and persist the task only if the
    /// claim returns `Ok(true)`.
    ///
    /// Returns the id of the persisted task, `None` if the claim declined,
    /// or the claim's error after rolling back.
    async fn add_task(&self, claim: ClaimFn) -> Result<Option<TaskId>, PipelineError>;
}

/// Shared registration handle.
pub type AddTaskHandle = Arc<dyn AddTask>;
