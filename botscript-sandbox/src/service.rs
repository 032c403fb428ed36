//! Sandbox service - main entry point

use crate::config::{SandboxConfig, WorkerMode};
use crate::error::Result;
use crate::execution::ExecutionId;
use crate::types::{ExecutionOutcome, Script, ScriptRequest, ScriptResponse};
use crate::watchdog::Watchdog;
use crate::worker::{IsolateWorker, ProcessWorker, Worker};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Script execution service
///
/// Cheap to share behind an `Arc`; every request gets its own worker and
/// its own supervision, nothing is shared between executions besides the
/// immutable configuration.
pub struct SandboxService {
    worker: Arc<dyn Worker>,
    watchdog: Watchdog,
    permits: Arc<Semaphore>,
}

impl SandboxService {
    /// Create a new sandbox service with the given worker backend
    pub fn new(worker: impl Worker + 'static, watchdog: Watchdog, max_concurrent: usize) -> Self {
        Self {
            worker: Arc::new(worker),
            watchdog,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Build the service described by `config`.
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let hard_timeout = config.validate()?;
        let watchdog = Watchdog::new(hard_timeout);

        let service = match config.worker_mode {
            WorkerMode::Process => {
                let worker = match &config.worker_program {
                    Some(program) => ProcessWorker::new(program, &config.limits),
                    None => ProcessWorker::current_exe(&config.limits)?,
                };
                Self::new(worker, watchdog, config.max_concurrent)
            }
            WorkerMode::InProcess => Self::new(
                IsolateWorker::new(config.limits),
                watchdog,
                config.max_concurrent,
            ),
        };

        tracing::info!(
            worker = service.worker_name(),
            hard_timeout_ms = hard_timeout.as_millis() as u64,
            max_execution_time_ms = config.limits.max_execution_time_ms,
            max_heap_size_bytes = config.limits.max_heap_size_bytes,
            max_concurrent = config.max_concurrent,
            "Sandbox service configured"
        );
        Ok(service)
    }

    /// Execute a script. Always resolves to exactly one outcome.
    pub async fn run(&self, script: Script) -> ExecutionOutcome {
        let id = ExecutionId::new();
        let span = tracing::info_span!("execution", execution_id = %id, worker = self.worker.name());

        async move {
            tracing::info!(script_len = script.len(), "Executing script");

            let _permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::warn!(error = %e, "Execution slots closed");
                    return ExecutionOutcome::KillError(e.to_string());
                }
            };

            let start = Instant::now();
            let outcome = self
                .watchdog
                .supervise(id, self.worker.as_ref(), &script)
                .await;

            tracing::info!(
                outcome = outcome.kind(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Execution resolved"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    /// Handle a wire request and produce the fixed response shape.
    pub async fn handle(&self, request: ScriptRequest) -> ScriptResponse {
        self.run(Script::from(request)).await.into()
    }

    /// Get the worker backend name
    pub fn worker_name(&self) -> &str {
        self.worker.name()
    }

    pub fn hard_timeout(&self) -> std::time::Duration {
        self.watchdog.hard_timeout()
    }
}
