//! Process-based worker - runs each script in a child process

use super::{Worker, WorkerControl, WorkerHandle, WorkerOutput};
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use crate::types::{Script, ScriptRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;

/// Largest result a worker may write before it is treated as misbehaving
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const REAP_GRACE: Duration = Duration::from_millis(250);

/// Process-based worker
///
/// Spawns `program` with `args`, writes `{"script": ...}` to its stdin, closes
/// it, and collects a single JSON result from stdout.
pub struct ProcessWorker {
    program: PathBuf,
    args: Vec<String>,
    max_output_bytes: usize,
}

impl ProcessWorker {
    /// Worker running `program worker` with the interpreter limits passed on
    /// the command line.
    pub fn new(program: impl Into<PathBuf>, limits: &ResourceLimits) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "worker".to_string(),
                "--max-execution-time-ms".to_string(),
                limits.max_execution_time_ms.to_string(),
                "--max-heap-size-bytes".to_string(),
                limits.max_heap_size_bytes.to_string(),
            ],
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Worker re-executing the running binary.
    pub fn current_exe(limits: &ResourceLimits) -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, limits))
    }

    /// Worker running an arbitrary command speaking the worker protocol.
    pub fn with_command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn start(&self, script: &Script) -> Result<WorkerHandle> {
        let payload = serde_json::to_vec(&ScriptRequest::new(script.as_str()))
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::WorkerStart(format!("{}: {}", self.program.display(), e))
            })?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, program = %self.program.display(), "Worker process spawned");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, pid));
        }

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let max_output_bytes = self.max_output_bytes;
        let (output_tx, output_rx) = oneshot::channel();

        tokio::spawn(async move {
            let output = exchange(stdin, payload, stdout, max_output_bytes).await;
            // The watchdog may already have moved on after a timeout
            let _ = output_tx.send(output);
        });

        Ok(WorkerHandle {
            output: output_rx,
            control: Box::new(ChildControl { child, pid }),
        })
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Write the request, close stdin, then read stdout to EOF.
async fn exchange(
    stdin: Option<ChildStdin>,
    payload: Vec<u8>,
    stdout: Option<ChildStdout>,
    max_output_bytes: usize,
) -> WorkerOutput {
    if let Some(mut stdin) = stdin {
        // A worker that died early shows up as missing output below
        if let Err(e) = stdin.write_all(&payload).await {
            tracing::debug!(error = %e, "Failed to write request to worker");
        }
        drop(stdin);
    }

    let Some(stdout) = stdout else {
        return WorkerOutput::Failed(SandboxError::MissingOutput);
    };

    let mut buf = Vec::new();
    let mut limited = stdout.take(max_output_bytes as u64 + 1);
    match limited.read_to_end(&mut buf).await {
        Ok(_) if buf.len() > max_output_bytes => WorkerOutput::Failed(SandboxError::OutputTooLarge {
            limit: max_output_bytes,
        }),
        Ok(_) => WorkerOutput::Stdout(buf),
        Err(e) => WorkerOutput::Failed(e.into()),
    }
}

async fn forward_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(pid = ?pid, "[worker] {}", line);
    }
}

struct ChildControl {
    child: Child,
    pid: Option<u32>,
}

#[async_trait]
impl WorkerControl for ChildControl {
    async fn kill(&mut self) -> Result<()> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = ?self.pid, %status, "Worker already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                return Err(SandboxError::KillUnconfirmed(format!(
                    "pid {:?}: {}",
                    self.pid, e
                )))
            }
        }

        self.child.kill().await.map_err(|e| {
            SandboxError::KillUnconfirmed(format!("pid {:?}: {}", self.pid, e))
        })?;
        tracing::debug!(pid = ?self.pid, "Worker killed");
        Ok(())
    }

    async fn reap(&mut self) -> Result<()> {
        match tokio::time::timeout(REAP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    tracing::debug!(pid = ?self.pid, %status, "Worker exited with failure status");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "Worker closed stdout but kept running; killing");
                self.kill().await
            }
        }
    }
}
