//! Execution identity and lifecycle tracking

use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};

/// Unique execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    /// Worker finished on its own
    Completed,
    /// Hard timer won the race and the worker was killed
    TimedOut,
    /// Worker was terminated for a reason other than the timer
    Killed,
    Resolved,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Killed)
    }

    fn can_advance_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            // A worker that never started can still be resolved as killed
            (Pending, Killed) | (Pending, TimedOut) => true,
            (Running, Completed) | (Running, TimedOut) | (Running, Killed) => true,
            (from, Resolved) => from.is_terminal(),
            _ => false,
        }
    }
}

/// Single-shot lifecycle of one request.
///
/// `Pending -> Running -> {Completed | TimedOut | Killed} -> Resolved`
#[derive(Debug, Clone)]
pub struct Lifecycle {
    id: ExecutionId,
    status: ExecutionStatus,
}

impl Lifecycle {
    pub fn new(id: ExecutionId) -> Self {
        Self {
            id,
            status: ExecutionStatus::Pending,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ExecutionStatus::Resolved
    }

    pub fn advance(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(SandboxError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::trace!(execution_id = %self.id, from = ?self.status, to = ?next, "lifecycle");
        self.status = next;
        Ok(())
    }
}
