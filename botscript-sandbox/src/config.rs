//! Sandbox configuration

use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How workers are backed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMode {
    /// One child process per execution
    #[default]
    Process,
    /// One V8 isolate on a dedicated thread per execution
    InProcess,
}

impl FromStr for WorkerMode {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "process" | "subprocess" => Ok(Self::Process),
            "in-process" | "inprocess" | "isolate" => Ok(Self::InProcess),
            other => Err(SandboxError::InvalidConfig(format!(
                "unknown worker mode '{}' (expected 'process' or 'in-process')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::InProcess => f.write_str("in-process"),
        }
    }
}

/// Immutable sandbox configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    #[serde(flatten)]
    pub limits: ResourceLimits,

    /// Process-level hard timeout; defaults to the interpreter budget
    pub watchdog_timeout_ms: Option<u64>,

    pub worker_mode: WorkerMode,

    /// Executable serving the `worker` subcommand; defaults to the running binary
    pub worker_program: Option<PathBuf>,

    /// Maximum simultaneous executions
    pub max_concurrent: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            watchdog_timeout_ms: None,
            worker_mode: WorkerMode::default(),
            worker_program: None,
            max_concurrent: 16,
        }
    }
}

impl SandboxConfig {
    /// Validate and return the resolved watchdog timeout.
    pub fn validate(&self) -> Result<Duration> {
        self.limits.validate()?;
        if self.max_concurrent == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_concurrent cannot be zero".to_string(),
            ));
        }
        self.limits.watchdog_timeout(self.watchdog_timeout_ms)
    }
}
