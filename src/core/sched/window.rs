//! Scheduling queue and worker windows.

use serde::{Deserialize, Serialize};

use crate::core::sched::resources::{ActiveResources, WorkerInfo};
use crate::util::serde::{RegisteredSealProof, SectorId, TaskType, WorkerId};

/// A pending request to run one task on some worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Arrival order, for logs.
    pub sequence: u64,
    /// Sector the task works on.
    pub sector: SectorId,
    /// Task type.
    pub task_type: TaskType,
    /// Seal proof of the sector.
    pub proof: RegisteredSealProof,
}

/// FIFO of pending requests.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    requests: Vec<WorkerRequest>,
}

impl RequestQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Append a request.
    pub fn push(&mut self, request: WorkerRequest) {
        self.requests.push(request);
    }

    /// Pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Request at a queue position.
    pub fn get(&self, index: usize) -> Option<&WorkerRequest> {
        self.requests.get(index)
    }

    /// Requests in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerRequest> {
        self.requests.iter()
    }

    /// Remove the requests at `indices` in one pass, keeping the relative
    /// order of what remains. Out-of-range and repeated indices are ignored.
    pub fn remove_indices(&mut self, indices: &[usize]) -> usize {
        if indices.is_empty() {
            return 0;
        }
        let mut remove = vec![false; self.requests.len()];
        for &i in indices {
            if let Some(slot) = remove.get_mut(i) {
                *slot = true;
            }
        }
        let before = self.requests.len();
        let mut pos = 0;
        self.requests.retain(|_| {
            let keep = !remove[pos];
            pos += 1;
            keep
        });
        before - self.requests.len()
    }
}

impl FromIterator<WorkerRequest> for RequestQueue {
    fn from_iter<I: IntoIterator<Item = WorkerRequest>>(iter: I) -> Self {
        Self {
            requests: iter.into_iter().collect(),
        }
    }
}

/// An open slot of capacity on one worker.
#[derive(Debug, Clone, Default)]
pub struct SchedWindow {
    /// Worker owning the window.
    pub worker: WorkerId,
    /// Resources already committed in this window.
    pub allocated: ActiveResources,
    /// Requests placed into this window, in placement order.
    pub todo: Vec<WorkerRequest>,
}

impl SchedWindow {
    /// Empty window on `worker`.
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            allocated: ActiveResources::default(),
            todo: Vec::new(),
        }
    }
}

/// Scheduler-side view of a connected worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    /// Static worker description.
    pub info: WorkerInfo,
    /// Disabled workers receive no new work.
    pub enabled: bool,
}

impl WorkerHandle {
    /// Enabled handle for `info`.
    pub const fn new(info: WorkerInfo) -> Self {
        Self {
            info,
            enabled: true,
        }
    }
}
