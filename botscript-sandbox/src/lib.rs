//! Botscript sandbox - resource-bounded execution of untrusted scripts
//!
//! Scripts run under two independent limits: an interpreter-level interrupt
//! and heap cap inside V8, and a process-level watchdog that kills a worker
//! which outlives its hard timeout. Workers are either child processes or
//! isolates on dedicated threads.

mod config;
mod engine;
mod error;
mod execution;
mod interrupt;
mod limits;
pub mod protocol;
mod race;
mod service;
mod types;
mod watchdog;
pub mod worker;

pub use config::{SandboxConfig, WorkerMode};
pub use engine::{ScriptEngine, V8Engine};
pub use error::{Result, SandboxError};
pub use execution::{ExecutionId, ExecutionStatus, Lifecycle};
pub use interrupt::{ArmedInterrupt, InterruptController, InterruptSignal, Interruptible};
pub use limits::{ResourceLimits, MIN_HEAP_SIZE_BYTES};
pub use race::{OutcomeRace, RaceEntrant};
pub use service::SandboxService;
pub use types::{
    ExecutionOutcome, Script, ScriptRequest, ScriptResponse, WorkerResponse, ERROR_MARKER,
    TIMEOUT_MARKER,
};
pub use watchdog::Watchdog;
pub use worker::{IsolateWorker, ProcessWorker, Worker, WorkerControl, WorkerHandle, WorkerOutput};
