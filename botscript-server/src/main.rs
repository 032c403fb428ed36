//! Botscript server binary
//!
//! `serve` runs the HTTP endpoint; `worker` executes a single script read
//! from stdin and is what the server spawns for each process-backed request.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use botscript_sandbox::{protocol, ResourceLimits, SandboxService, V8Engine, WorkerMode};
use botscript_server::{AppState, ServerConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "botscript-server")]
#[command(about = "Run untrusted scripts under time and memory limits")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP endpoint (default if no subcommand provided)
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address
        #[arg(long)]
        host: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Worker backend (process, in-process)
        #[arg(long, value_parser = ["process", "in-process"])]
        worker_mode: Option<String>,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Execute one script from stdin and print the result as JSON
    Worker {
        #[arg(long, default_value_t = ResourceLimits::default().max_execution_time_ms)]
        max_execution_time_ms: u64,

        #[arg(long, default_value_t = ResourceLimits::default().max_heap_size_bytes)]
        max_heap_size_bytes: usize,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        host: None,
        port: None,
        worker_mode: None,
        verbose: false,
    }) {
        Commands::Serve {
            config,
            host,
            port,
            worker_mode,
            verbose,
        } => {
            init_logging(verbose);

            let mut config = ServerConfig::load(config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(mode) = worker_mode {
                config.sandbox.worker_mode = mode.parse::<WorkerMode>()?;
            }
            config.validate()?;

            serve(config).await
        }
        Commands::Worker {
            max_execution_time_ms,
            max_heap_size_bytes,
        } => {
            // stdout carries the protocol; logs go to stderr
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();

            let limits = ResourceLimits::new(max_execution_time_ms, max_heap_size_bytes);
            run_worker(&limits)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();
}

async fn serve(config: ServerConfig) -> Result<()> {
    info!("Starting botscript server...");

    let service =
        SandboxService::from_config(&config.sandbox).context("Failed to build sandbox service")?;
    let state = AppState::new(service);

    let bind_addr = config.bind_addr();
    info!("Starting server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(botscript_server::configure)
    })
    .workers(config.http_workers)
    .client_request_timeout(config.client_timeout())
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}

fn run_worker(limits: &ResourceLimits) -> Result<()> {
    limits.validate()?;
    let engine = V8Engine::new();
    let outcome = protocol::serve(
        &engine,
        limits,
        std::io::stdin().lock(),
        std::io::stdout().lock(),
    )?;
    tracing::debug!(outcome = outcome.kind(), "Worker finished");
    Ok(())
}
