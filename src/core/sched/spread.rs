//! Spread assignment of queued requests to worker windows.
//!
//! One pass walks the queue in order. Each request looks only at its
//! acceptable windows and picks, among those that can admit it, the window
//! whose worker has received the fewest requests so far in this pass. Ties go
//! to the first feasible window. Requests that fit nowhere stay queued.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::AssignerKind;
use crate::core::sched::window::{RequestQueue, SchedWindow, WorkerHandle};
use crate::util::serde::WorkerId;

/// Place queued requests into windows.
///
/// `acceptable[i]` lists, in preference order, the window indices able to run
/// the request at queue position `i`. Placed requests are appended to their
/// window's `todo` list, accounted in its allocation, and removed from the
/// queue in one order-preserving pass. Returns how many were placed.
pub fn spread_ws(
    queue: &mut RequestQueue,
    acceptable: &[Vec<usize>],
    windows: &mut [SchedWindow],
    workers: &HashMap<WorkerId, WorkerHandle>,
) -> usize {
    let mut worker_assigned: HashMap<WorkerId, usize> = HashMap::new();
    let mut placed: Vec<usize> = Vec::new();

    for (sq_idx, request) in queue.iter().enumerate() {
        let Some(candidates) = acceptable.get(sq_idx) else {
            continue;
        };

        let mut selected: Option<(usize, usize)> = None;
        for &wnd_idx in candidates {
            let Some(window) = windows.get(wnd_idx) else {
                continue;
            };
            let Some(worker) = workers.get(&window.worker) else {
                trace!(window = wnd_idx, worker = %window.worker, "window worker gone");
                continue;
            };

            let needs = worker
                .info
                .resources
                .resource_spec(request.proof, request.task_type);
            if !window.allocated.can_handle_request(
                request.task_type,
                &needs,
                window.worker,
                "schedAssign",
                &worker.info,
            ) {
                continue;
            }

            let assigned = worker_assigned.get(&window.worker).copied().unwrap_or(0);
            trace!(
                sector = %request.sector,
                task = %request.task_type,
                window = wnd_idx,
                worker = %window.worker,
                assigned,
                "feasible window"
            );
            match selected {
                Some((_, best)) if assigned >= best => {}
                _ => selected = Some((wnd_idx, assigned)),
            }
        }

        let Some((wnd_idx, _)) = selected else {
            trace!(sector = %request.sector, task = %request.task_type, "no feasible window, left queued");
            continue;
        };

        let window = &mut windows[wnd_idx];
        let Some(worker) = workers.get(&window.worker) else {
            continue;
        };
        let needs = worker
            .info
            .resources
            .resource_spec(request.proof, request.task_type);
        window
            .allocated
            .add(request.task_type, &worker.info.resources, &needs);
        window.todo.push(request.clone());
        *worker_assigned.entry(window.worker).or_insert(0) += 1;
        placed.push(sq_idx);

        debug!(
            sector = %request.sector,
            task = %request.task_type,
            sequence = request.sequence,
            window = wnd_idx,
            worker = %window.worker,
            hostname = %worker.info.hostname,
            "assigned request to window"
        );
    }

    queue.remove_indices(&placed);
    placed.len()
}

/// Window indices each queued request may run on: the worker is enabled,
/// accepts the task type, and the window can admit the request right now.
pub fn acceptable_windows(
    queue: &RequestQueue,
    windows: &[SchedWindow],
    workers: &HashMap<WorkerId, WorkerHandle>,
) -> Vec<Vec<usize>> {
    queue
        .iter()
        .map(|request| {
            windows
                .iter()
                .enumerate()
                .filter(|(_, window)| {
                    let Some(worker) = workers.get(&window.worker) else {
                        return false;
                    };
                    if !worker.enabled || !worker.info.task_types.contains(&request.task_type) {
                        return false;
                    }
                    let needs = worker
                        .info
                        .resources
                        .resource_spec(request.proof, request.task_type);
                    window.allocated.can_handle_request(
                        request.task_type,
                        &needs,
                        window.worker,
                        "acceptableWindows",
                        &worker.info,
                    )
                })
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect()
}

/// Scheduler state one assignment pass operates on.
#[derive(Debug, Default)]
pub struct SchedState {
    /// Pending requests.
    pub queue: RequestQueue,
    /// Open windows.
    pub windows: Vec<SchedWindow>,
    /// Connected workers.
    pub workers: HashMap<WorkerId, WorkerHandle>,
}

/// Window selection policy.
pub trait Assigner: Send + Sync {
    /// Run one pass and return how many requests were placed.
    fn try_sched(&self, state: &mut SchedState) -> usize;
}

/// Spread policy: prefer workers with the fewest assignments this pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadAssigner;

impl Assigner for SpreadAssigner {
    fn try_sched(&self, state: &mut SchedState) -> usize {
        if state.queue.is_empty() || state.windows.is_empty() {
            return 0;
        }
        let acceptable = acceptable_windows(&state.queue, &state.windows, &state.workers);
        let scheduled = spread_ws(
            &mut state.queue,
            &acceptable,
            &mut state.windows,
            &state.workers,
        );
        debug!(scheduled, remaining = state.queue.len(), "assignment pass complete");
        scheduled
    }
}

/// Assigner for a configured policy.
pub fn assigner_for(kind: AssignerKind) -> Box<dyn Assigner> {
    match kind {
        AssignerKind::Spread => Box::new(SpreadAssigner),
    }
}
