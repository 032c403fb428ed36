//! Worker abstraction and implementations
//!
//! A worker is one execution attempt, backed either by a child process or by
//! an interpreter on a dedicated thread. The [`Watchdog`](crate::Watchdog)
//! starts it, reads its output and is the only party allowed to kill it.

pub mod isolate;
pub mod process;

use crate::error::{Result, SandboxError};
use crate::protocol;
use crate::types::{ExecutionOutcome, Script};
use async_trait::async_trait;
use tokio::sync::oneshot;

pub use isolate::IsolateWorker;
pub use process::ProcessWorker;

/// Whatever a worker produced when it finished.
///
/// Decoding is deferred until the watchdog has resolved the race.
#[derive(Debug)]
pub enum WorkerOutput {
    /// Raw bytes a worker process wrote to stdout
    Stdout(Vec<u8>),

    /// Outcome returned by an in-process interpreter
    Returned(ExecutionOutcome),

    /// The worker failed before producing output
    Failed(SandboxError),
}

impl WorkerOutput {
    pub fn into_outcome(self) -> Result<ExecutionOutcome> {
        match self {
            Self::Stdout(bytes) => protocol::decode_response(&bytes),
            Self::Returned(outcome) => Ok(outcome),
            Self::Failed(err) => Err(err),
        }
    }
}

/// A started worker.
pub struct WorkerHandle {
    /// Resolves once the worker finished producing output
    pub output: oneshot::Receiver<WorkerOutput>,

    /// Lifecycle control, owned by the watchdog
    pub control: Box<dyn WorkerControl>,
}

/// Worker backend abstraction
#[async_trait]
pub trait Worker: Send + Sync {
    /// Start executing `script` and return a handle to the running attempt
    async fn start(&self, script: &Script) -> Result<WorkerHandle>;

    /// Get worker backend name
    fn name(&self) -> &str;
}

/// Termination side of a running worker
#[async_trait]
pub trait WorkerControl: Send {
    /// Forcibly stop the worker. `Ok` means termination was confirmed.
    async fn kill(&mut self) -> Result<()>;

    /// Make sure a worker that finished on its own has fully exited,
    /// killing it if it lingers.
    async fn reap(&mut self) -> Result<()>;
}
