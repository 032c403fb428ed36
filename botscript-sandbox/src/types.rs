//! Core types for sandbox execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error marker returned for timed out executions
pub const TIMEOUT_MARKER: &str = "Timeout";

/// Error marker returned when supervision failed
pub const ERROR_MARKER: &str = "Error";

/// Untrusted script source, alive for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script(String);

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ScriptRequest> for Script {
    fn from(request: ScriptRequest) -> Self {
        Self(request.script)
    }
}

/// Request body: `{"script": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub script: String,
}

impl ScriptRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

/// Response body. Exactly one of the fields is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub result: String,
    pub error: String,
}

impl ScriptResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: String::new(),
            error: message.into(),
        }
    }
}

/// Final result of one execution. Exactly one is produced per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Script completed; holds its final value stringified by the interpreter
    Success(String),

    /// Script failed (syntax error, uncaught exception, heap exhaustion)
    RuntimeError(String),

    /// Execution budget exhausted
    Timeout,

    /// Supervision failed; the message stays internal
    KillError(String),
}

impl ExecutionOutcome {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RuntimeError(_) => "runtime_error",
            Self::Timeout => "timeout",
            Self::KillError(_) => "kill_error",
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => write!(f, "success: {}", value),
            Self::RuntimeError(message) => write!(f, "runtime error: {}", message),
            Self::Timeout => f.write_str("timeout"),
            Self::KillError(message) => write!(f, "kill error: {}", message),
        }
    }
}

impl From<ExecutionOutcome> for ScriptResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success(value) => Self {
                result: value,
                error: String::new(),
            },
            ExecutionOutcome::RuntimeError(message) => Self::error(message),
            ExecutionOutcome::Timeout => Self::error(TIMEOUT_MARKER),
            ExecutionOutcome::KillError(_) => Self::error(ERROR_MARKER),
        }
    }
}

/// Single JSON object a worker process writes to stdout.
///
/// `timed_out` is absent from older workers, which only wrote
/// `result`/`error`; it defaults to false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub result: String,

    #[serde(default)]
    pub error: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl WorkerResponse {
    pub fn into_outcome(self) -> ExecutionOutcome {
        if self.timed_out {
            ExecutionOutcome::Timeout
        } else if !self.error.is_empty() {
            ExecutionOutcome::RuntimeError(self.error)
        } else {
            ExecutionOutcome::Success(self.result)
        }
    }
}

impl From<ExecutionOutcome> for WorkerResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        let timed_out = matches!(outcome, ExecutionOutcome::Timeout);
        let ScriptResponse { result, error } = outcome.into();
        Self {
            result,
            error,
            timed_out,
        }
    }
}
