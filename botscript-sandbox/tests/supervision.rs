//! End-to-end supervision through the service with both worker backends

use assert_matches::assert_matches;
use botscript_sandbox::{
    ExecutionOutcome, IsolateWorker, ProcessWorker, ResourceLimits, SandboxService, Script,
    ScriptRequest, ScriptResponse, Watchdog,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn isolate_service(time_ms: u64, watchdog_ms: u64) -> SandboxService {
    let limits = ResourceLimits::new(time_ms, 64 * 1024 * 1024);
    SandboxService::new(
        IsolateWorker::new(limits),
        Watchdog::new(Duration::from_millis(watchdog_ms)),
        4,
    )
}

#[tokio::test]
async fn test_isolate_success() {
    init_tracing();
    let service = isolate_service(300, 300);
    let response = service.handle(ScriptRequest::new("1+1")).await;
    assert_eq!(
        response,
        ScriptResponse {
            result: "2".into(),
            error: "".into()
        }
    );
}

#[tokio::test]
async fn test_isolate_syntax_error() {
    let service = isolate_service(300, 300);
    let response = service.handle(ScriptRequest::new("not valid js((")).await;
    assert_eq!(response.result, "");
    assert!(response.error.contains("SyntaxError"), "{}", response.error);
}

#[tokio::test]
async fn test_isolate_infinite_loop_times_out_and_service_survives() {
    init_tracing();
    let service = isolate_service(300, 300);

    let started = Instant::now();
    let response = service.handle(ScriptRequest::new("while(true){}")).await;
    let elapsed = started.elapsed();
    assert_eq!(response, ScriptResponse::error("Timeout"));
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);

    assert_eq!(
        service.run(Script::new("'still alive'")).await,
        ExecutionOutcome::Success("still alive".into())
    );
}

#[tokio::test]
async fn test_interpreter_limit_fires_under_longer_watchdog() {
    let service = isolate_service(100, 2_000);
    let started = Instant::now();
    assert_eq!(
        service.run(Script::new("for(;;){}")).await,
        ExecutionOutcome::Timeout
    );
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_requests_are_isolated() {
    let service = Arc::new(isolate_service(1_000, 1_000));
    let mut tasks = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            let source = format!("globalThis.n = (globalThis.n || 0) + {i}; n");
            service.run(Script::new(source)).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(
            task.await.unwrap(),
            ExecutionOutcome::Success(i.to_string())
        );
    }
}

#[cfg(unix)]
mod process {
    use super::*;

    fn shell_service(command: &str, watchdog_ms: u64) -> SandboxService {
        SandboxService::new(
            ProcessWorker::with_command("/bin/sh", ["-c", command]),
            Watchdog::new(Duration::from_millis(watchdog_ms)),
            2,
        )
    }

    #[tokio::test]
    async fn test_worker_result_is_parsed() {
        let service = shell_service(
            r#"cat > /dev/null; echo '{"result":"hello","error":""}'"#,
            1_000,
        );
        assert_eq!(
            service.run(Script::new("ignored")).await,
            ExecutionOutcome::Success("hello".into())
        );
    }

    #[tokio::test]
    async fn test_hung_worker_is_killed_on_time() {
        init_tracing();
        let service = shell_service("sleep 30", 200);
        let started = Instant::now();
        assert_eq!(
            service.run(Script::new("while(true){}")).await,
            ExecutionOutcome::Timeout
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_truncated_output_is_kill_error() {
        let service = shell_service(r#"cat > /dev/null; printf '{"result":"2'"#, 1_000);
        let outcome = service.run(Script::new("1+1")).await;
        assert_matches!(outcome, ExecutionOutcome::KillError(_));
        assert_eq!(ScriptResponse::from(outcome), ScriptResponse::error("Error"));
    }

    #[tokio::test]
    async fn test_silent_crash_is_kill_error() {
        let service = shell_service("exit 3", 1_000);
        assert_matches!(
            service.run(Script::new("1")).await,
            ExecutionOutcome::KillError(_)
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_kill_error() {
        let service = SandboxService::new(
            ProcessWorker::with_command("/nonexistent/botscript-worker", Vec::<String>::new()),
            Watchdog::new(Duration::from_millis(500)),
            1,
        );
        assert_matches!(
            service.run(Script::new("1")).await,
            ExecutionOutcome::KillError(_)
        );
    }

    #[tokio::test]
    async fn test_oversized_output_is_kill_error() {
        let service = SandboxService::new(
            ProcessWorker::with_command("/bin/sh", ["-c", "cat > /dev/null; yes"])
                .max_output_bytes(4096),
            Watchdog::new(Duration::from_millis(1_000)),
            1,
        );
        assert_matches!(
            service.run(Script::new("1")).await,
            ExecutionOutcome::KillError(message) if message.contains("exceeded")
        );
    }
}
