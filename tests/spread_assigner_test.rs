//! Integration tests for the spread assigner.
//!
//! This test validates:
//! 1. Earlier-queued requests get first choice of windows
//! 2. New work goes to the worker with fewest assignments this pass
//! 3. Infeasible requests stay queued in order for the next pass
//! 4. Allocation grows with placements and is never released here

use std::collections::{HashMap, HashSet};

use seal_pipeline::config::{AssignerKind, SchedulerConfig};
use seal_pipeline::core::sched::{
    assigner_for, spread_ws, RequestQueue, SchedState, SchedWindow, WorkerHandle, WorkerInfo,
    WorkerRequest, WorkerResources,
};
use seal_pipeline::util::serde::{RegisteredSealProof, SectorId, TaskType, WorkerId};

fn worker(name: &str, cpus: u64) -> WorkerHandle {
    WorkerHandle::new(WorkerInfo {
        hostname: name.to_string(),
        task_types: HashSet::from([TaskType::PreCommit1, TaskType::Commit1]),
        resources: WorkerResources {
            memory_physical: 128 << 30,
            cpus,
            ..WorkerResources::default()
        },
        ignore_resources: false,
    })
}

fn request(sequence: u64, task_type: TaskType) -> WorkerRequest {
    WorkerRequest {
        sequence,
        sector: SectorId::new(1000, sequence),
        task_type,
        proof: RegisteredSealProof::StackedDrg2KiBV1_1,
    }
}

fn sequences(queue: &RequestQueue) -> Vec<u64> {
    queue.iter().map(|r| r.sequence).collect()
}

#[test]
fn test_earlier_request_takes_shared_window() {
    // T0 may run on W1 or W2, T1 only on W1; each window fits one task
    let w1 = WorkerId::new();
    let w2 = WorkerId::new();
    let workers = HashMap::from([(w1, worker("w1", 1)), (w2, worker("w2", 1))]);
    let mut windows = vec![SchedWindow::new(w1), SchedWindow::new(w2)];
    let mut queue: RequestQueue = [request(0, TaskType::PreCommit1), request(1, TaskType::PreCommit1)]
        .into_iter()
        .collect();

    let scheduled = spread_ws(&mut queue, &[vec![0, 1], vec![0]], &mut windows, &workers);

    assert_eq!(scheduled, 1);
    assert_eq!(windows[0].todo.len(), 1);
    assert_eq!(windows[0].todo[0].sequence, 0);
    assert!(windows[1].todo.is_empty());
    assert_eq!(sequences(&queue), vec![1]);
}

#[test]
fn test_second_task_spreads_to_other_worker() {
    // windows on workers A, A, B, each fitting one task
    let a = WorkerId::new();
    let b = WorkerId::new();
    let workers = HashMap::from([(a, worker("a", 1)), (b, worker("b", 1))]);
    let mut windows = vec![SchedWindow::new(a), SchedWindow::new(a), SchedWindow::new(b)];
    let mut queue: RequestQueue = (0..2).map(|n| request(n, TaskType::PreCommit1)).collect();

    let scheduled = spread_ws(
        &mut queue,
        &[vec![0, 1, 2], vec![0, 1, 2]],
        &mut windows,
        &workers,
    );

    assert_eq!(scheduled, 2);
    assert_eq!(windows[0].todo[0].sequence, 0);
    assert!(windows[1].todo.is_empty());
    assert_eq!(windows[2].todo[0].sequence, 1);
}

#[test]
fn test_pass_is_deterministic() {
    let a = WorkerId::new();
    let b = WorkerId::new();
    let workers = HashMap::from([(a, worker("a", 2)), (b, worker("b", 2))]);
    let acceptable = vec![vec![0, 1]; 5];

    let run = || {
        let mut windows = vec![SchedWindow::new(a), SchedWindow::new(b)];
        let mut queue: RequestQueue = (0..5).map(|n| request(n, TaskType::PreCommit1)).collect();
        spread_ws(&mut queue, &acceptable, &mut windows, &workers);
        (
            windows
                .iter()
                .map(|w| w.todo.iter().map(|r| r.sequence).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
            sequences(&queue),
        )
    };

    let first = run();
    assert_eq!(first, run());
    // alternates between workers, then the leftover waits
    assert_eq!(first.0, vec![vec![0, 2], vec![1, 3]]);
    assert_eq!(first.1, vec![4]);
}

#[test]
fn test_leftovers_keep_order_and_place_next_pass() {
    let a = WorkerId::new();
    let mut state = SchedState {
        queue: (0..4).map(|n| request(n, TaskType::PreCommit1)).collect(),
        windows: vec![SchedWindow::new(a)],
        workers: HashMap::from([(a, worker("a", 1))]),
    };
    let assigner = assigner_for(SchedulerConfig::default().assigner);

    assert_eq!(assigner.try_sched(&mut state), 1);
    assert_eq!(sequences(&state.queue), vec![1, 2, 3]);

    // a fresh window opens on the same worker
    state.windows.push(SchedWindow::new(a));
    assert_eq!(assigner.try_sched(&mut state), 1);
    assert_eq!(sequences(&state.queue), vec![2, 3]);
    assert_eq!(state.windows[1].todo[0].sequence, 1);
}

#[test]
fn test_concurrency_cap_limits_window() {
    let a = WorkerId::new();
    let mut handle = worker("a", 64);
    let mut needs = handle
        .info
        .resources
        .resource_spec(RegisteredSealProof::StackedDrg2KiBV1_1, TaskType::PreCommit1);
    needs.max_concurrent = 2;
    handle.info.resources.overrides.insert(
        (TaskType::PreCommit1, RegisteredSealProof::StackedDrg2KiBV1_1),
        needs,
    );
    let mut state = SchedState {
        queue: (0..3).map(|n| request(n, TaskType::PreCommit1)).collect(),
        windows: vec![SchedWindow::new(a)],
        workers: HashMap::from([(a, handle)]),
    };

    let scheduled = assigner_for(AssignerKind::Spread).try_sched(&mut state);

    assert_eq!(scheduled, 2);
    assert_eq!(state.windows[0].allocated.task_count(TaskType::PreCommit1), 2);
    assert_eq!(sequences(&state.queue), vec![2]);
}

#[test]
fn test_unsupported_task_type_stays_queued() {
    let a = WorkerId::new();
    let mut state = SchedState {
        queue: [request(0, TaskType::Commit2), request(1, TaskType::Commit1)]
            .into_iter()
            .collect(),
        windows: vec![SchedWindow::new(a)],
        workers: HashMap::from([(a, worker("a", 8))]),
    };

    assert_eq!(assigner_for(AssignerKind::Spread).try_sched(&mut state), 1);
    assert_eq!(sequences(&state.queue), vec![0]);
}
