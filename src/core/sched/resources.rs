//! Worker resources and per-window allocation accounting.
//!
//! [`Resources`] describes what one task of a given type and seal proof needs.
//! [`ActiveResources`] is the running allocation of a window; its
//! [`can_handle_request`](ActiveResources::can_handle_request) is the admission
//! test the assigner consults before placing work.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::util::serde::{RegisteredSealProof, TaskType, WorkerId};

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Resource needs of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Memory that must be physically available.
    pub min_memory: u64,
    /// Peak memory, may be backed by swap.
    pub max_memory: u64,
    /// Threads used; `-1` means all cores.
    pub max_parallelism: i32,
    /// Threads used when running on GPU; `0` means same as `max_parallelism`.
    pub max_parallelism_gpu: i32,
    /// Fraction of a GPU used.
    pub gpu_utilization: f64,
    /// Per-task fixed memory overhead.
    pub base_min_memory: u64,
    /// Cap on concurrent tasks of this type per window; `0` is unlimited.
    pub max_concurrent: u32,
}

impl Resources {
    /// Threads a task claims on a worker with `wcpus` cores and `gpus` GPUs.
    pub fn threads(&self, wcpus: u64, gpus: usize) -> u64 {
        let mut mp = self.max_parallelism;
        if self.gpu_utilization > 0.0 && gpus > 0 && self.max_parallelism_gpu != 0 {
            mp = self.max_parallelism_gpu;
        }
        if mp < 0 {
            return wcpus;
        }
        u64::from(mp.unsigned_abs())
    }

    /// Built-in resource needs for a task type and seal proof.
    pub fn default_for(task_type: TaskType, proof: RegisteredSealProof) -> Self {
        let class = SizeClass::of(proof);
        let pick = |small: u64, m512: u64, g32: u64, g64: u64| -> u64 {
            match class {
                SizeClass::Small => small,
                SizeClass::M512 => m512,
                SizeClass::G32 => g32,
                SizeClass::G64 => g64,
            }
        };
        let tiny = proof.sector_size();

        match task_type {
            TaskType::AddPiece => Self {
                min_memory: pick(tiny, GIB, 4 * GIB, 8 * GIB),
                max_memory: pick(tiny, GIB, 4 * GIB, 8 * GIB),
                max_parallelism: 1,
                max_parallelism_gpu: 0,
                gpu_utilization: 0.0,
                base_min_memory: pick(tiny, GIB, GIB, GIB),
                max_concurrent: 0,
            },
            TaskType::PreCommit1 => Self {
                min_memory: pick(tiny, 768 * MIB, 56 * GIB, 112 * GIB),
                max_memory: pick(tiny, 768 * MIB, 64 * GIB, 128 * GIB),
                max_parallelism: 1,
                max_parallelism_gpu: 0,
                gpu_utilization: 0.0,
                base_min_memory: pick(tiny, 10 * MIB, 10 * MIB, 10 * MIB),
                max_concurrent: 0,
            },
            TaskType::PreCommit2 => Self {
                min_memory: pick(tiny, 1536 * MIB, 15 * GIB, 30 * GIB),
                max_memory: pick(tiny, 1536 * MIB, 15 * GIB, 30 * GIB),
                max_parallelism: -1,
                max_parallelism_gpu: 6,
                gpu_utilization: 1.0,
                base_min_memory: pick(tiny, GIB, GIB, GIB),
                max_concurrent: 0,
            },
            TaskType::Commit1 => Self {
                min_memory: pick(tiny, GIB, GIB, GIB),
                max_memory: pick(tiny, GIB, GIB, GIB),
                max_parallelism: 0,
                max_parallelism_gpu: 0,
                gpu_utilization: 0.0,
                base_min_memory: pick(tiny, GIB, GIB, GIB),
                max_concurrent: 0,
            },
            TaskType::Commit2 => Self {
                min_memory: pick(tiny, 2 * GIB, 30 * GIB, 60 * GIB),
                max_memory: pick(tiny, 1536 * MIB, 150 * GIB, 190 * GIB),
                max_parallelism: -1,
                max_parallelism_gpu: 6,
                gpu_utilization: 1.0,
                base_min_memory: pick(tiny, 10 * GIB, 32 * GIB, 64 * GIB),
                max_concurrent: 0,
            },
            TaskType::Finalize | TaskType::Fetch => Self {
                min_memory: MIB,
                max_memory: MIB,
                max_parallelism: 0,
                max_parallelism_gpu: 0,
                gpu_utilization: 0.0,
                base_min_memory: if task_type == TaskType::Fetch { 0 } else { MIB },
                max_concurrent: 0,
            },
        }
    }
}

#[derive(Clone, Copy)]
enum SizeClass {
    Small,
    M512,
    G32,
    G64,
}

impl SizeClass {
    const fn of(proof: RegisteredSealProof) -> Self {
        match proof {
            RegisteredSealProof::StackedDrg2KiBV1_1 | RegisteredSealProof::StackedDrg8MiBV1_1 => {
                Self::Small
            }
            RegisteredSealProof::StackedDrg512MiBV1_1 => Self::M512,
            RegisteredSealProof::StackedDrg32GiBV1_1 => Self::G32,
            RegisteredSealProof::StackedDrg64GiBV1_1 => Self::G64,
        }
    }
}

/// Resource totals reported by a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerResources {
    /// Physical memory.
    pub memory_physical: u64,
    /// Memory used by things other than scheduled tasks.
    pub memory_used: u64,
    /// Swap size.
    pub memory_swap: u64,
    /// Swap used by things other than scheduled tasks.
    pub memory_swap_used: u64,
    /// Logical cores.
    pub cpus: u64,
    /// GPU names.
    pub gpus: Vec<String>,
    /// Per (task type, proof) overrides of the built-in needs.
    #[serde(skip)]
    pub overrides: HashMap<(TaskType, RegisteredSealProof), Resources>,
}

impl WorkerResources {
    /// Totals for the local machine; memory comes from the caller.
    pub fn detect(memory_physical: u64, memory_swap: u64) -> Self {
        Self {
            memory_physical,
            memory_swap,
            cpus: num_cpus::get() as u64,
            ..Self::default()
        }
    }

    /// Needs of a task on this worker.
    pub fn resource_spec(&self, proof: RegisteredSealProof, task_type: TaskType) -> Resources {
        self.overrides
            .get(&(task_type, proof))
            .cloned()
            .unwrap_or_else(|| Resources::default_for(task_type, proof))
    }
}

/// Static description of a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Host name, for logs.
    pub hostname: String,
    /// Task types this worker accepts.
    pub task_types: HashSet<TaskType>,
    /// Resource totals.
    pub resources: WorkerResources,
    /// Skip resource checks (concurrency caps still apply).
    pub ignore_resources: bool,
}

/// Resources allocated in one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveResources {
    /// Sum of `min_memory` of allocated tasks.
    pub memory_used_min: u64,
    /// Sum of `max_memory` of allocated tasks.
    pub memory_used_max: u64,
    /// GPUs in use (fractional).
    pub gpu_used: f64,
    /// Threads in use.
    pub cpu_use: u64,
    task_counts: HashMap<TaskType, u32>,
}

impl ActiveResources {
    /// Allocated tasks of a type.
    pub fn task_count(&self, task_type: TaskType) -> u32 {
        self.task_counts.get(&task_type).copied().unwrap_or(0)
    }

    /// Whether a task with `needs` fits on top of the current allocation.
    pub fn can_handle_request(
        &self,
        task_type: TaskType,
        needs: &Resources,
        wid: WorkerId,
        caller: &str,
        info: &WorkerInfo,
    ) -> bool {
        if needs.max_concurrent > 0 && self.task_count(task_type) >= needs.max_concurrent {
            trace!(worker = %wid, caller, task = %task_type, "at {} concurrent task limit", needs.max_concurrent);
            return false;
        }
        if info.ignore_resources {
            return true;
        }

        let res = &info.resources;

        let mem_needed = needs.min_memory + needs.base_min_memory;
        let mem_avail = res.memory_physical.saturating_sub(self.memory_used_min);
        if mem_needed > mem_avail {
            trace!(worker = %wid, caller, task = %task_type, mem_needed, mem_avail, "not enough physical memory");
            return false;
        }

        let vmem_needed = needs.max_memory + needs.base_min_memory;
        let reserved = res.memory_used + res.memory_swap_used;
        let vmem_used = self.memory_used_max.max(reserved);
        let vmem_avail = (res.memory_physical + res.memory_swap).saturating_sub(vmem_used);
        if vmem_needed > vmem_avail {
            trace!(worker = %wid, caller, task = %task_type, vmem_needed, vmem_avail, "not enough virtual memory");
            return false;
        }

        if self.cpu_use + needs.threads(res.cpus, res.gpus.len()) > res.cpus {
            trace!(worker = %wid, caller, task = %task_type, cpu_use = self.cpu_use, "not enough threads");
            return false;
        }

        if !res.gpus.is_empty() && needs.gpu_utilization > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let gpus = res.gpus.len() as f64;
            if self.gpu_used + needs.gpu_utilization > gpus {
                trace!(worker = %wid, caller, task = %task_type, gpu_used = self.gpu_used, "not enough GPU");
                return false;
            }
        }

        true
    }

    /// Account a placed task.
    pub fn add(&mut self, task_type: TaskType, wr: &WorkerResources, needs: &Resources) {
        if !wr.gpus.is_empty() {
            self.gpu_used += needs.gpu_utilization;
        }
        self.cpu_use += needs.threads(wr.cpus, wr.gpus.len());
        self.memory_used_min += needs.min_memory;
        self.memory_used_max += needs.max_memory;
        *self.task_counts.entry(task_type).or_insert(0) += 1;
    }
}
