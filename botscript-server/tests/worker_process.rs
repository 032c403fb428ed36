//! The server binary acting as its own worker process

use assert_matches::assert_matches;
use botscript_sandbox::{
    ExecutionOutcome, ProcessWorker, ResourceLimits, SandboxService, Script, Watchdog,
};
use std::time::{Duration, Instant};

const WORKER: &str = env!("CARGO_BIN_EXE_botscript-server");

fn service(time_ms: u64, watchdog_ms: u64) -> SandboxService {
    let limits = ResourceLimits::new(time_ms, 64 * 1024 * 1024);
    SandboxService::new(
        ProcessWorker::new(WORKER, &limits),
        Watchdog::new(Duration::from_millis(watchdog_ms)),
        2,
    )
}

#[tokio::test]
async fn test_worker_evaluates_script() {
    let service = service(300, 10_000);
    assert_eq!(
        service.run(Script::new("1+1")).await,
        ExecutionOutcome::Success("2".into())
    );
}

#[tokio::test]
async fn test_worker_reports_syntax_error() {
    let service = service(300, 10_000);
    assert_matches!(
        service.run(Script::new("not valid js((")).await,
        ExecutionOutcome::RuntimeError(message) if message.contains("SyntaxError")
    );
}

#[tokio::test]
async fn test_worker_infinite_loop_times_out() {
    let service = service(300, 10_000);
    let started = Instant::now();
    assert_eq!(
        service.run(Script::new("while(true){}")).await,
        ExecutionOutcome::Timeout
    );
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_hard_timeout_kills_worker() {
    // Interpreter limit far beyond the watchdog: only the kill can end it
    let service = service(60_000, 500);
    let started = Instant::now();
    assert_eq!(
        service.run(Script::new("while(true){}")).await,
        ExecutionOutcome::Timeout
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_single_huge_allocation_stays_capped() {
    let limits = ResourceLimits::new(5_000, 16 * 1024 * 1024);
    let service = SandboxService::new(
        ProcessWorker::new(WORKER, &limits),
        Watchdog::new(Duration::from_millis(10_000)),
        1,
    );
    assert_matches!(
        service.run(Script::new("'x'.repeat(2 ** 28).length")).await,
        ExecutionOutcome::RuntimeError(_) | ExecutionOutcome::KillError(_)
    );
    assert_eq!(
        service.run(Script::new("'still ' + 'serving'")).await,
        ExecutionOutcome::Success("still serving".into())
    );
}
