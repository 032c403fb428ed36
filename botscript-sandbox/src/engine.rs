//! V8 script engine using deno_core
//!
//! Every call builds a brand new isolate, so nothing a script does survives
//! into the next request. The isolate has no ops beyond the deno_core
//! built-ins and the `Deno` global is removed before user code runs, leaving
//! no path to the filesystem or network.

use crate::interrupt::{InterruptController, InterruptSignal};
use crate::limits::ResourceLimits;
use crate::types::{ExecutionOutcome, Script};
use deno_core::{v8, JsRuntime, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BOOTSTRAP_JS: &str = "delete globalThis.Deno;";

/// Extra heap granted once, after the limit is first hit, so the
/// termination can unwind.
const HEAP_GRACE_BYTES: usize = 8 * 1024 * 1024;

/// Runs one script to completion under the given limits.
///
/// Implementations must never panic or abort the host on script behaviour;
/// every failure is folded into the returned outcome.
pub trait ScriptEngine: Send + Sync {
    fn execute(&self, script: &Script, limits: &ResourceLimits) -> ExecutionOutcome;

    /// Get engine name
    fn name(&self) -> &str;
}

/// V8 JavaScript engine
#[derive(Debug, Clone, Default)]
pub struct V8Engine;

impl V8Engine {
    pub fn new() -> Self {
        Self
    }

    /// Execute `script`, handing an interrupt for the isolate to `on_ready`
    /// as soon as the isolate exists.
    ///
    /// The handed-out signal is independent of the execution-time timer and
    /// stays usable until the isolate is gone.
    pub fn execute_observed<F>(
        &self,
        script: &Script,
        limits: &ResourceLimits,
        on_ready: F,
    ) -> ExecutionOutcome
    where
        F: FnOnce(InterruptSignal),
    {
        let max_bytes = limits.max_heap_size_bytes;
        let initial_bytes = (max_bytes / 10).min(10 * 1024 * 1024);
        let mut runtime = JsRuntime::new(RuntimeOptions {
            create_params: Some(v8::CreateParams::default().heap_limits(initial_bytes, max_bytes)),
            ..Default::default()
        });

        // V8 aborts the whole process on a hard OOM. Terminate the script
        // instead and raise the limit once so the termination can unwind.
        let heap_exhausted = Arc::new(AtomicBool::new(false));
        let heap_flag = Arc::clone(&heap_exhausted);
        let heap_handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current_limit, _initial_limit| {
            if heap_flag.swap(true, Ordering::SeqCst) {
                return current_limit;
            }
            heap_handle.terminate_execution();
            current_limit + HEAP_GRACE_BYTES
        });

        on_ready(InterruptSignal::new(runtime.v8_isolate().thread_safe_handle()));

        if let Err(e) = runtime.execute_script("<bootstrap>", BOOTSTRAP_JS) {
            return ExecutionOutcome::KillError(format!("bootstrap failed: {}", e));
        }

        let timer = InterruptSignal::new(runtime.v8_isolate().thread_safe_handle());
        let armed = match InterruptController::arm(timer, limits.max_execution_time()) {
            Ok(armed) => armed,
            Err(e) => return ExecutionOutcome::KillError(e.to_string()),
        };

        // Stringifying the result may call back into user code, so it runs
        // under the same timer and exception handler as the script itself.
        let outcome = {
            let scope = &mut runtime.handle_scope();
            let tc = &mut v8::TryCatch::new(scope);
            match evaluate(tc, script.as_str()) {
                Some(value) => ExecutionOutcome::Success(value),
                None if tc.has_terminated() && heap_exhausted.load(Ordering::SeqCst) => {
                    ExecutionOutcome::RuntimeError(format!(
                        "Uncaught RangeError: Out of memory, heap limit of {} bytes exceeded",
                        max_bytes
                    ))
                }
                None if tc.has_terminated() => ExecutionOutcome::Timeout,
                None => ExecutionOutcome::RuntimeError(exception_message(tc)),
            }
        };

        if armed.disarm() {
            tracing::debug!("execution time limit reached");
        }
        outcome
    }
}

/// Compile, run and stringify. `None` means an exception or termination is
/// pending on the enclosing `TryCatch`.
fn evaluate(scope: &mut v8::HandleScope, source: &str) -> Option<String> {
    let source = v8::String::new(scope, source)?;
    let compiled = v8::Script::compile(scope, source, None)?;
    let value = compiled.run(scope)?;
    let text = value.to_string(scope)?;
    Some(text.to_rust_string_lossy(scope))
}

/// The interpreter's own `Uncaught ...` text for the caught exception.
fn exception_message(tc: &mut v8::TryCatch<v8::HandleScope>) -> String {
    match tc.message() {
        Some(message) => {
            let text = message.get(tc);
            text.to_rust_string_lossy(tc)
        }
        None => "Uncaught exception".to_string(),
    }
}

impl ScriptEngine for V8Engine {
    fn execute(&self, script: &Script, limits: &ResourceLimits) -> ExecutionOutcome {
        self.execute_observed(script, limits, |_| {})
    }

    fn name(&self) -> &str {
        "v8"
    }
}
