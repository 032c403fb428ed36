//! Worker process protocol
//!
//! The supervisor writes one `{"script": ...}` object to the worker's stdin
//! and closes it. The worker answers with one [`WorkerResponse`] on stdout and
//! exits. Logging in the worker must go to stderr.

use crate::engine::ScriptEngine;
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use crate::types::{ExecutionOutcome, Script, ScriptRequest, WorkerResponse};
use std::io::{Read, Write};

/// Worker side: read one request, execute it, write one response.
pub fn serve<E, R, W>(
    engine: &E,
    limits: &ResourceLimits,
    mut input: R,
    mut output: W,
) -> Result<ExecutionOutcome>
where
    E: ScriptEngine + ?Sized,
    R: Read,
    W: Write,
{
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let request: ScriptRequest =
        serde_json::from_slice(&raw).map_err(|e| SandboxError::Protocol(e.to_string()))?;

    let outcome = engine.execute(&Script::from(request), limits);

    serde_json::to_writer(&mut output, &WorkerResponse::from(outcome.clone()))
        .map_err(|e| SandboxError::Protocol(e.to_string()))?;
    output.write_all(b"\n")?;
    output.flush()?;

    Ok(outcome)
}

/// Supervisor side: decode what a worker wrote to stdout.
pub fn decode_response(raw: &[u8]) -> Result<ExecutionOutcome> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return Err(SandboxError::MissingOutput);
    }
    let response: WorkerResponse =
        serde_json::from_str(text).map_err(|e| SandboxError::MalformedOutput(e.to_string()))?;
    Ok(response.into_outcome())
}
