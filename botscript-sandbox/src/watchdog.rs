//! Process-level supervision of a single execution
//!
//! The watchdog arms a hard timer, starts the worker and races the worker's
//! completion against the timer. Whichever signal arrives first decides the
//! outcome; the other is discarded. A worker still running when the race is
//! decided is killed before `supervise` returns.

use crate::error::SandboxError;
use crate::execution::{ExecutionId, ExecutionStatus, Lifecycle};
use crate::race::OutcomeRace;
use crate::types::{ExecutionOutcome, Script};
use crate::worker::{Worker, WorkerOutput};
use std::time::Duration;
use tokio::time::Instant;

/// How long a start still running at the deadline may take to hand over
/// something killable
const START_GRACE: Duration = Duration::from_secs(1);

enum Signal {
    Completed(WorkerOutput),
    Expired,
}

/// Hard-timeout supervisor
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    hard_timeout: Duration,
}

impl Watchdog {
    pub fn new(hard_timeout: Duration) -> Self {
        Self { hard_timeout }
    }

    pub fn hard_timeout(&self) -> Duration {
        self.hard_timeout
    }

    /// Run `script` on `worker` and resolve exactly one outcome.
    pub async fn supervise(
        &self,
        id: ExecutionId,
        worker: &dyn Worker,
        script: &Script,
    ) -> ExecutionOutcome {
        let mut lifecycle = Lifecycle::new(id);
        let race = OutcomeRace::new();

        // The timer is armed before the worker starts so slow startup
        // counts against the deadline.
        let deadline = Instant::now() + self.hard_timeout;
        let timer_entrant = race.entrant();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timer_entrant.finish(Signal::Expired)
        });

        let start = worker.start(script);
        tokio::pin!(start);
        let handle = match tokio::time::timeout_at(deadline, &mut start).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                timer.abort();
                tracing::warn!(execution_id = %id, error = %e, "Worker failed to start");
                advance(&mut lifecycle, ExecutionStatus::Killed);
                advance(&mut lifecycle, ExecutionStatus::Resolved);
                return ExecutionOutcome::KillError(e.to_string());
            }
            Err(_) => {
                tracing::warn!(execution_id = %id, "Worker did not start before the deadline");
                // Let the start finish so the attempt it created can be killed
                let outcome = match tokio::time::timeout(START_GRACE, start).await {
                    Ok(Ok(handle)) => {
                        let mut control = handle.control;
                        match control.kill().await {
                            Ok(()) => ExecutionOutcome::Timeout,
                            Err(e) => {
                                tracing::warn!(
                                    execution_id = %id,
                                    error = %e,
                                    "Failed to kill worker"
                                );
                                ExecutionOutcome::KillError(e.to_string())
                            }
                        }
                    }
                    Ok(Err(_)) => ExecutionOutcome::Timeout,
                    Err(_) => ExecutionOutcome::KillError(
                        "worker start did not return after the deadline".to_string(),
                    ),
                };
                let status = if outcome == ExecutionOutcome::Timeout {
                    ExecutionStatus::TimedOut
                } else {
                    ExecutionStatus::Killed
                };
                advance(&mut lifecycle, status);
                advance(&mut lifecycle, ExecutionStatus::Resolved);
                return outcome;
            }
        };
        advance(&mut lifecycle, ExecutionStatus::Running);

        let mut control = handle.control;
        let output = handle.output;
        let completion_entrant = race.entrant();
        tokio::spawn(async move {
            let output = output
                .await
                .unwrap_or(WorkerOutput::Failed(SandboxError::MissingOutput));
            if !completion_entrant.finish(Signal::Completed(output)) {
                tracing::debug!(execution_id = %id, "Late worker completion discarded");
            }
        });

        let outcome = match race.resolve().await {
            Some(Signal::Completed(output)) => {
                timer.abort();
                advance(&mut lifecycle, ExecutionStatus::Completed);
                if let Err(e) = control.reap().await {
                    tracing::warn!(execution_id = %id, error = %e, "Failed to reap worker");
                }
                match output.into_outcome() {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(execution_id = %id, error = %e, "Worker produced no usable result");
                        ExecutionOutcome::KillError(e.to_string())
                    }
                }
            }
            Some(Signal::Expired) => match control.kill().await {
                Ok(()) => {
                    tracing::info!(
                        execution_id = %id,
                        timeout_ms = self.hard_timeout.as_millis() as u64,
                        "Worker killed after hard timeout"
                    );
                    advance(&mut lifecycle, ExecutionStatus::TimedOut);
                    ExecutionOutcome::Timeout
                }
                Err(e) => {
                    tracing::warn!(execution_id = %id, error = %e, "Failed to kill worker");
                    advance(&mut lifecycle, ExecutionStatus::Killed);
                    ExecutionOutcome::KillError(e.to_string())
                }
            },
            None => {
                // Both producers vanished; make sure nothing outlives the request
                let _ = control.kill().await;
                advance(&mut lifecycle, ExecutionStatus::Killed);
                ExecutionOutcome::KillError("no completion or timeout signal".to_string())
            }
        };

        advance(&mut lifecycle, ExecutionStatus::Resolved);
        outcome
    }
}

fn advance(lifecycle: &mut Lifecycle, next: ExecutionStatus) {
    if let Err(e) = lifecycle.advance(next) {
        tracing::error!(execution_id = %lifecycle.id(), error = %e, "Lifecycle violation");
    }
}
