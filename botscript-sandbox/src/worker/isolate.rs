//! In-process worker - runs V8 on a dedicated thread
//!
//! V8 isolates are `!Send`, so each execution gets its own OS thread that
//! creates, runs and drops the isolate. Killing the worker means terminating
//! the isolate and waiting for that thread to finish.

use super::{Worker, WorkerControl, WorkerHandle, WorkerOutput};
use crate::engine::V8Engine;
use crate::error::{Result, SandboxError};
use crate::interrupt::InterruptSignal;
use crate::limits::ResourceLimits;
use crate::types::Script;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// In-process V8 worker
pub struct IsolateWorker {
    engine: V8Engine,
    limits: ResourceLimits,
    kill_grace: Duration,
}

impl IsolateWorker {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            engine: V8Engine::new(),
            limits,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// How long to wait for the isolate thread after terminating it
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

#[async_trait]
impl Worker for IsolateWorker {
    async fn start(&self, script: &Script) -> Result<WorkerHandle> {
        let (output_tx, output_rx) = oneshot::channel();
        // Dropped when the thread ends, including by panic
        let (exit_tx, exit_rx) = oneshot::channel::<()>();

        let slot = IsolateSlot::default();
        let thread_slot = slot.clone();
        let engine = self.engine.clone();
        let limits = self.limits;
        let script = script.clone();

        std::thread::Builder::new()
            .name("botscript-isolate".to_string())
            .spawn(move || {
                let _exit = exit_tx;
                let outcome =
                    engine.execute_observed(&script, &limits, |signal| thread_slot.publish(signal));
                if output_tx.send(WorkerOutput::Returned(outcome)).is_err() {
                    tracing::debug!("isolate result receiver dropped");
                }
            })
            .map_err(|e| SandboxError::WorkerStart(e.to_string()))?;

        Ok(WorkerHandle {
            output: output_rx,
            control: Box::new(IsolateControl {
                slot,
                exited: Some(exit_rx),
                grace: self.kill_grace,
            }),
        })
    }

    fn name(&self) -> &str {
        "in-process"
    }
}

enum SlotState {
    /// Isolate not created yet
    Starting,
    Ready(InterruptSignal),
    /// Kill arrived before the isolate existed
    KillRequested,
}

/// Hand-off point between the isolate thread and whoever may kill it.
#[derive(Clone)]
struct IsolateSlot(Arc<Mutex<SlotState>>);

impl Default for IsolateSlot {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(SlotState::Starting)))
    }
}

impl IsolateSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called from the isolate thread once the isolate exists.
    fn publish(&self, signal: InterruptSignal) {
        let mut state = self.lock();
        if matches!(*state, SlotState::KillRequested) {
            signal.trigger();
        } else {
            *state = SlotState::Ready(signal);
        }
    }

    /// Terminate the isolate now, or as soon as it is published.
    fn terminate(&self) {
        let mut state = self.lock();
        if let SlotState::Ready(signal) = &*state {
            if !signal.trigger() {
                tracing::debug!("isolate interrupt already delivered");
            }
        } else {
            *state = SlotState::KillRequested;
        }
    }
}

struct IsolateControl {
    slot: IsolateSlot,
    exited: Option<oneshot::Receiver<()>>,
    grace: Duration,
}

impl IsolateControl {
    /// Wait up to the grace period for the isolate thread to end.
    async fn wait_exit(&mut self) -> bool {
        let Some(exited) = self.exited.take() else {
            return true;
        };
        tokio::time::timeout(self.grace, exited).await.is_ok()
    }
}

#[async_trait]
impl WorkerControl for IsolateControl {
    async fn kill(&mut self) -> Result<()> {
        self.slot.terminate();
        if self.wait_exit().await {
            Ok(())
        } else {
            Err(SandboxError::KillUnconfirmed(format!(
                "isolate thread still running {:?} after termination",
                self.grace
            )))
        }
    }

    async fn reap(&mut self) -> Result<()> {
        if self.wait_exit().await {
            return Ok(());
        }
        self.slot.terminate();
        Err(SandboxError::KillUnconfirmed(
            "isolate thread did not exit after reporting".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionOutcome;
    use std::time::Instant;

    fn worker(time_ms: u64) -> IsolateWorker {
        IsolateWorker::new(ResourceLimits::new(time_ms, 64 * 1024 * 1024))
            .kill_grace(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_kill_stops_running_script() {
        let mut handle = worker(60_000)
            .start(&Script::new("for(;;){}"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        handle.control.kill().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            handle.output.await.unwrap().into_outcome().unwrap(),
            ExecutionOutcome::Timeout
        );
    }

    #[tokio::test]
    async fn test_kill_during_result_conversion() {
        let mut handle = worker(60_000)
            .start(&Script::new("({ toString() { for(;;){} } })"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.control.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_kill_before_isolate_is_ready() {
        let mut handle = worker(60_000)
            .start(&Script::new("for(;;){}"))
            .await
            .unwrap();
        // Usually lands before the thread has built its isolate
        handle.control.kill().await.unwrap();
        assert!(handle.output.await.is_ok());
    }

    #[tokio::test]
    async fn test_kill_after_completion_is_confirmed() {
        let mut handle = worker(1_000).start(&Script::new("1+1")).await.unwrap();
        let output = (&mut handle.output).await.unwrap();
        assert_eq!(
            output.into_outcome().unwrap(),
            ExecutionOutcome::Success("2".into())
        );
        handle.control.kill().await.unwrap();
    }
}
