//! Resource limits configuration for sandboxed execution

use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest heap V8 can bootstrap a context in.
pub const MIN_HEAP_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// Resource limits applied to every execution.
///
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Interpreter-level execution budget
    pub max_execution_time_ms: u64,

    /// Interpreter heap cap in bytes
    pub max_heap_size_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 300,
            max_heap_size_bytes: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl ResourceLimits {
    pub fn new(max_execution_time_ms: u64, max_heap_size_bytes: usize) -> Self {
        Self {
            max_execution_time_ms,
            max_heap_size_bytes,
        }
    }

    pub fn max_execution_time(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    /// Check the limits are usable by the interpreter.
    pub fn validate(&self) -> Result<()> {
        if self.max_execution_time_ms == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_execution_time_ms cannot be zero".to_string(),
            ));
        }
        if self.max_heap_size_bytes < MIN_HEAP_SIZE_BYTES {
            return Err(SandboxError::InvalidConfig(format!(
                "max_heap_size_bytes {} is below the interpreter minimum of {} bytes",
                self.max_heap_size_bytes, MIN_HEAP_SIZE_BYTES
            )));
        }
        Ok(())
    }

    /// Resolve the process-level hard timeout for these limits.
    ///
    /// `None` pairs the watchdog with the interpreter budget. An explicit value
    /// must not undercut the interpreter budget.
    pub fn watchdog_timeout(&self, watchdog_timeout_ms: Option<u64>) -> Result<Duration> {
        match watchdog_timeout_ms {
            None => Ok(self.max_execution_time()),
            Some(ms) if ms < self.max_execution_time_ms => Err(SandboxError::InvalidConfig(
                format!(
                    "watchdog_timeout_ms {} must be at least max_execution_time_ms {}",
                    ms, self.max_execution_time_ms
                ),
            )),
            Some(ms) => Ok(Duration::from_millis(ms)),
        }
    }
}
