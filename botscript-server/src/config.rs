//! Server configuration
//!
//! Layers, later wins: built-in defaults, optional TOML file, `BOTSCRIPT_*`
//! environment variables, command-line flags.

use crate::error::{Result, ServerError};
use botscript_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "BOTSCRIPT_";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// actix worker threads
    pub http_workers: usize,
    /// Deadline for a client to send its request
    pub client_timeout_ms: u64,
    pub sandbox: SandboxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7690,
            http_workers: 1,
            client_timeout_ms: 500,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load defaults, then the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ServerError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Override fields from `BOTSCRIPT_*` variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = parse("PORT", &port)?;
        }
        if let Some(workers) = var("HTTP_WORKERS") {
            self.http_workers = parse("HTTP_WORKERS", &workers)?;
        }
        if let Some(ms) = var("CLIENT_TIMEOUT_MS") {
            self.client_timeout_ms = parse("CLIENT_TIMEOUT_MS", &ms)?;
        }

        let sandbox = &mut self.sandbox;
        if let Some(ms) = var("MAX_EXECUTION_TIME_MS") {
            sandbox.limits.max_execution_time_ms = parse("MAX_EXECUTION_TIME_MS", &ms)?;
        }
        if let Some(bytes) = var("MAX_HEAP_SIZE_BYTES") {
            sandbox.limits.max_heap_size_bytes = parse("MAX_HEAP_SIZE_BYTES", &bytes)?;
        }
        if let Some(ms) = var("WATCHDOG_TIMEOUT_MS") {
            sandbox.watchdog_timeout_ms = Some(parse("WATCHDOG_TIMEOUT_MS", &ms)?);
        }
        if let Some(mode) = var("WORKER_MODE") {
            sandbox.worker_mode = mode.parse()?;
        }
        if let Some(program) = var("WORKER_PROGRAM") {
            sandbox.worker_program = Some(PathBuf::from(program));
        }
        if let Some(max) = var("MAX_CONCURRENT") {
            sandbox.max_concurrent = parse("MAX_CONCURRENT", &max)?;
        }
        Ok(())
    }

    /// Fail fast on settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.http_workers == 0 {
            return Err(ServerError::Config(
                "http_workers cannot be zero".to_string(),
            ));
        }
        self.sandbox.validate()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ServerError::Config(format!("Invalid {}{} '{}': {}", ENV_PREFIX, name, value, e))
    })
}
