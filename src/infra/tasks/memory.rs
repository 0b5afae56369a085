//! In-process task engine.
//!
//! Mints ids from a shared counter the way the task table's sequence would,
//! runs the poller's claim with each id, and keeps only the registrations the
//! claim accepted.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::registration::{AddTask, ClaimFn};
use crate::core::PipelineError;
use crate::util::serde::TaskId;

/// Registration handle backed by process memory.
pub struct LocalTaskEngine {
    name: String,
    next_id: Arc<AtomicI64>,
    tasks: Mutex<Vec<TaskId>>,
    rolled_back: AtomicUsize,
    refusing: AtomicBool,
}

impl LocalTaskEngine {
    /// Engine for task type `name` with its own id counter starting at 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self::sharing_ids(name, Arc::new(AtomicI64::new(1)))
    }

    /// Engine drawing ids from a counter shared with other engines.
    pub fn sharing_ids(name: impl Into<String>, next_id: Arc<AtomicI64>) -> Self {
        Self {
            name: name.into(),
            next_id,
            tasks: Mutex::new(Vec::new()),
            rolled_back: AtomicUsize::new(0),
            refusing: AtomicBool::new(false),
        }
    }

    /// Task type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ids of persisted tasks, in registration order.
    pub fn tasks(&self) -> Vec<TaskId> {
        self.tasks.lock().clone()
    }

    /// Registrations rolled back so far.
    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Refuse new registrations, as a draining engine would.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::Relaxed);
    }
}

#[async_trait]
impl AddTask for LocalTaskEngine {
    async fn add_task(&self, claim: ClaimFn) -> Result<Option<TaskId>, PipelineError> {
        if self.refusing.load(Ordering::Relaxed) {
            return Err(PipelineError::Registration(format!(
                "{} engine is not accepting tasks",
                self.name
            )));
        }

        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match claim(task_id).await {
            Ok(true) => {
                self.tasks.lock().push(task_id);
                debug!(engine = %self.name, task_id, "task registered");
                Ok(Some(task_id))
            }
            Ok(false) => {
                self.rolled_back.fetch_add(1, Ordering::Relaxed);
                debug!(engine = %self.name, task_id, "claim declined, registration rolled back");
                Ok(None)
            }
            Err(err) => {
                self.rolled_back.fetch_add(1, Ordering::Relaxed);
                warn!(engine = %self.name, task_id, error = %err, "claim failed, registration rolled back");
                Err(err)
            }
        }
    }
}
