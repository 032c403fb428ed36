//! Interpreter-level time limit enforcement
//!
//! A dedicated thread sleeps for the execution budget and then asks the
//! interpreter to abort at its next checkpoint. The thread is independent of
//! the script's control flow and of the async runtime, so a saturated
//! executor cannot delay the interrupt.

use crate::error::{Result, SandboxError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const DISARMED: u8 = 2;

/// Something that can be asked to stop at its next safe checkpoint.
pub trait Interruptible: Send + Sync + 'static {
    /// Request an abort. Returns false if the target no longer exists.
    fn interrupt(&self) -> bool;
}

impl Interruptible for deno_core::v8::IsolateHandle {
    fn interrupt(&self) -> bool {
        self.terminate_execution()
    }
}

struct SignalInner {
    target: Box<dyn Interruptible>,
    state: AtomicU8,
}

/// Shared, fire-at-most-once interrupt for one interpreter instance.
#[derive(Clone)]
pub struct InterruptSignal {
    inner: Arc<SignalInner>,
}

impl InterruptSignal {
    pub fn new(target: impl Interruptible) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                target: Box::new(target),
                state: AtomicU8::new(ARMED),
            }),
        }
    }

    /// Deliver the interrupt unless it was already delivered or disarmed.
    ///
    /// Returns true only for the call that actually signalled the target.
    pub fn trigger(&self) -> bool {
        if self
            .inner
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if !self.inner.target.interrupt() {
            tracing::debug!("interrupt target already gone");
        }
        true
    }

    pub fn fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FIRED
    }

    /// Prevent any future trigger. Returns false if the interrupt already fired.
    fn disarm(&self) -> bool {
        match self.inner.state.compare_exchange(
            ARMED,
            DISARMED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(state) => state == DISARMED,
        }
    }
}

/// Arms interrupt timers.
pub struct InterruptController;

impl InterruptController {
    /// Start a timer thread that triggers `signal` once `after` elapses.
    pub fn arm(signal: InterruptSignal, after: Duration) -> Result<ArmedInterrupt> {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let timer_signal = signal.clone();

        let thread = std::thread::Builder::new()
            .name("botscript-interrupt".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(after) {
                    if timer_signal.trigger() {
                        tracing::debug!(after_ms = after.as_millis() as u64, "interrupt fired");
                    }
                }
            })
            .map_err(|e| SandboxError::WorkerStart(format!("failed to arm interrupt: {}", e)))?;

        Ok(ArmedInterrupt {
            signal,
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }
}

/// A running interrupt timer. Disarmed on drop.
pub struct ArmedInterrupt {
    signal: InterruptSignal,
    cancel: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ArmedInterrupt {
    pub fn fired(&self) -> bool {
        self.signal.fired()
    }

    /// Stop the timer and wait for its thread. Returns whether it fired.
    pub fn disarm(mut self) -> bool {
        self.shutdown();
        self.signal.fired()
    }

    fn shutdown(&mut self) {
        // Flip the state before waking the thread so a timer expiring at the
        // same instant cannot interrupt a finished script.
        self.signal.disarm();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("interrupt timer thread panicked");
            }
        }
    }
}

impl Drop for ArmedInterrupt {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct CountingTarget(Arc<AtomicUsize>);

    impl Interruptible for CountingTarget {
        fn interrupt(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_fires_after_budget() {
        let target = CountingTarget::default();
        let armed = InterruptController::arm(
            InterruptSignal::new(target.clone()),
            Duration::from_millis(20),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(armed.fired());
        assert!(armed.disarm());
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarm_before_expiry_never_fires() {
        let target = CountingTarget::default();
        let armed = InterruptController::arm(
            InterruptSignal::new(target.clone()),
            Duration::from_secs(30),
        )
        .unwrap();

        let started = std::time::Instant::now();
        assert!(!armed.disarm());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(target.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let target = CountingTarget::default();
        let signal = InterruptSignal::new(target.clone());
        let armed = InterruptController::arm(signal.clone(), Duration::from_millis(5)).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(!signal.trigger());
        assert!(!signal.trigger());
        drop(armed);
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarmed_signal_ignores_manual_trigger() {
        let target = CountingTarget::default();
        let signal = InterruptSignal::new(target.clone());
        let armed = InterruptController::arm(signal.clone(), Duration::from_secs(30)).unwrap();
        armed.disarm();

        assert!(!signal.trigger());
        assert!(!signal.fired());
        assert_eq!(target.0.load(Ordering::SeqCst), 0);
    }
}
