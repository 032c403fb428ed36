//! Error types for the sandbox

use crate::execution::ExecutionStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Failures of the sandbox machinery itself.
///
/// Script failures are not errors here: they are reported as
/// [`ExecutionOutcome::RuntimeError`](crate::ExecutionOutcome::RuntimeError).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to start worker: {0}")]
    WorkerStart(String),

    #[error("Worker exited without producing a result")]
    MissingOutput,

    #[error("Worker output could not be parsed: {0}")]
    MalformedOutput(String),

    #[error("Worker output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Worker termination could not be confirmed: {0}")]
    KillUnconfirmed(String),

    #[error("Invalid request: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid lifecycle transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
