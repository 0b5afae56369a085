//! Audit trail of poller decisions.
//!
//! Operators read it to see which process claimed which stage, when a message
//! landed, and which sectors are stuck waiting on missing on-chain state.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::serde::{SectorId, TaskId};

/// What the poller did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A stage was claimed under a new task id.
    Claim,
    /// A claim attempt hit a row-count mismatch.
    ClaimConflict,
    /// A submitted message landed and its on-chain state was found.
    Landed,
    /// A submitted message executed but its on-chain state is missing.
    LandingUnresolved,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Claim => "claim",
            Self::ClaimConflict => "claim_conflict",
            Self::Landed => "landed",
            Self::LandingUnresolved => "landing_unresolved",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Sector the event concerns.
    pub sector: SectorId,
    /// Stage or message label.
    pub stage: String,
    /// Action taken.
    pub action: AuditAction,
    /// Task id, for claims.
    pub task_id: Option<TaskId>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event stamped with the current time.
pub fn build_audit_event(
    sector: SectorId,
    stage: impl Into<String>,
    action: AuditAction,
    task_id: Option<TaskId>,
    detail: Option<String>,
) -> AuditEvent {
    let stage = stage.into();
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{sector}-{stage}-{action}-{created_at_ms}"),
        sector,
        stage,
        action,
        task_id,
        created_at_ms,
        detail,
    }
}
