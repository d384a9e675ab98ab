use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dronegate::handler::{Gateway, ResponseBody};
use dronegate::limiter::ExecutionLimiter;
use dronegate::solver::mock::MockSolver;
use dronegate::solver::process::ProcessSolver;
use dronegate::solver::{Solver, SolverResult};

const SAMPLE: &str = "3 3 10 5\n0 1 0\n0 2 1\n1 0 0\n1\n1 1";
const SOLVER_JSON: &str = r#"{"time":12,"path":[{"row":0,"col":0,"battery":10,"time":0},{"row":1,"col":1,"battery":8,"time":2}]}"#;

fn gateway_with(solver: Arc<dyn Solver>, capacity: usize) -> Gateway {
    Gateway::new(solver, ExecutionLimiter::new(capacity), 65536)
}

fn completed(json: &str) -> SolverResult {
    SolverResult::Completed(json.as_bytes().to_vec())
}

/// Panics on every call, standing in for a bug deep in the pipeline.
struct PanickingSolver;

#[async_trait]
impl Solver for PanickingSolver {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn solve(&self, _input: &str) -> SolverResult {
        panic!("solver exploded");
    }
}

#[tokio::test]
async fn valid_input_passes_solver_json_through_verbatim() {
    let solver = Arc::new(MockSolver::always(completed(SOLVER_JSON)));
    let gateway = gateway_with(solver.clone(), 3);

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        ResponseBody::Passthrough(SOLVER_JSON.as_bytes().to_vec())
    );
    let json = response.json().unwrap();
    assert_eq!(json["time"], 12);
    assert!(json["path"].is_array());
    assert_eq!(solver.inputs(), vec![SAMPLE.to_string()]);
}

#[tokio::test]
async fn short_header_is_rejected_without_running_solver() {
    let solver = Arc::new(MockSolver::always(completed("{}")));
    let gateway = gateway_with(solver.clone(), 3);

    let input = "5 5 10\n0 1 0 0 0\n0 1 0 0 0\n0 1 0 0 0\n0 1 0 0 0\n0 1 0 0 0\n0";
    let response = gateway.handle(input.as_bytes()).await;

    assert_eq!(response.status, 400);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid input format:"));
    assert!(error.contains("exactly 4 integers"));
    assert_eq!(solver.calls(), 0);
    assert_eq!(gateway.limiter().available(), 3);
}

#[tokio::test]
async fn short_grid_row_is_rejected() {
    let solver = Arc::new(MockSolver::always(completed("{}")));
    let gateway = gateway_with(solver.clone(), 3);

    let response = gateway.handle(b"3 3 10 5\n0 1\n0 2 1\n1 0 0\n0").await;

    assert_eq!(response.status, 400);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.contains("Grid line 1"));
    assert_eq!(solver.calls(), 0);
}

#[tokio::test]
async fn out_of_bounds_station_is_rejected() {
    let solver = Arc::new(MockSolver::always(completed("{}")));
    let gateway = gateway_with(solver.clone(), 3);

    let response = gateway.handle(b"3 3 10 5\n0 1 0\n0 2 1\n1 0 0\n1\n5 0").await;

    assert_eq!(response.status, 400);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.contains("(5, 0)"));
}

#[tokio::test]
async fn oversize_grid_is_rejected_with_size_message() {
    let solver = Arc::new(MockSolver::always(completed("{}")));
    let gateway = gateway_with(solver.clone(), 3);

    let large = format!(
        "1000 1000 10 5\n{}0",
        format!("{}\n", vec!["0"; 1000].join(" ")).repeat(1000)
    );
    assert!(large.len() > 65536);

    let response = gateway.handle(large.as_bytes()).await;

    assert_eq!(response.status, 400);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.contains("exceeds maximum"));
    assert!(error.contains("65536"));
    assert_eq!(solver.calls(), 0);
}

#[tokio::test]
async fn size_check_runs_before_grammar() {
    let gateway = gateway_with(Arc::new(MockSolver::always(completed("{}"))), 3);

    // Garbage that would fail the grammar; the size error must win.
    let junk = "x".repeat(70_000);
    let response = gateway.handle(junk.as_bytes()).await;

    assert_eq!(response.status, 400);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert_eq!(error, "Input size exceeds maximum of 65536 bytes");
}

#[tokio::test]
async fn size_limit_is_inclusive() {
    let solver = Arc::new(MockSolver::always(completed("{}")));
    let gateway = Gateway::new(solver.clone(), ExecutionLimiter::new(1), 64);

    let exact = format!("{SAMPLE:<64}");
    assert_eq!(exact.len(), 64);
    assert_eq!(gateway.handle(exact.as_bytes()).await.status, 200);

    let over = format!("{SAMPLE:<65}");
    assert_eq!(gateway.handle(over.as_bytes()).await.status, 400);
    assert_eq!(solver.calls(), 1);
}

#[tokio::test]
async fn invalid_utf8_is_rejected() {
    let gateway = gateway_with(Arc::new(MockSolver::always(completed("{}"))), 3);

    let response = gateway.handle(&[0x33, 0x20, 0xff, 0xfe]).await;

    assert_eq!(response.status, 400);
    assert_eq!(
        response.json().unwrap()["error"],
        "Invalid UTF-8 encoding in request body"
    );
}

#[tokio::test]
async fn timeout_maps_to_504_naming_the_bound() {
    let gateway = gateway_with(
        Arc::new(MockSolver::always(SolverResult::TimedOut {
            limit: Duration::from_secs(10),
        })),
        3,
    );

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 504);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.to_lowercase().contains("timeout"));
    assert!(error.contains("10s"));
}

#[tokio::test]
async fn crash_maps_to_500_with_stderr() {
    let gateway = gateway_with(
        Arc::new(MockSolver::always(SolverResult::CrashedNonZero {
            code: 1,
            stderr: "Segmentation fault".to_string(),
        })),
        3,
    );

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 500);
    let json = response.json().unwrap();
    assert_eq!(json["error"], "Solver execution failed");
    assert_eq!(json["stderr"], "Segmentation fault");
    assert_eq!(json["returncode"], 1);
}

#[tokio::test]
async fn non_json_output_maps_to_500_with_raw_stdout() {
    let gateway = gateway_with(
        Arc::new(MockSolver::always(completed("This is not JSON"))),
        3,
    );

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 500);
    let json = response.json().unwrap();
    assert!(json["error"].as_str().unwrap().contains("not valid JSON"));
    assert_eq!(json["stdout"], "This is not JSON");
    assert!(json["parse_error"].is_string());
}

#[tokio::test]
async fn unavailable_solver_maps_to_500() {
    let gateway = gateway_with(
        Arc::new(MockSolver::always(SolverResult::ProcessError(
            "failed to start bin/solver: No such file or directory".to_string(),
        ))),
        3,
    );

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 500);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Solver could not be invoked"));
    assert!(error.contains("bin/solver"));
}

#[tokio::test]
async fn panic_in_solver_becomes_500_and_releases_slot() {
    let gateway = gateway_with(Arc::new(PanickingSolver), 2);

    let response = gateway.handle(SAMPLE.as_bytes()).await;

    assert_eq!(response.status, 500);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert_eq!(error, "Unexpected error: solver exploded");
    assert_eq!(gateway.limiter().available(), 2);

    // Still serving afterwards.
    assert_eq!(gateway.handle(SAMPLE.as_bytes()).await.status, 500);
    assert_eq!(gateway.limiter().available(), 2);
}

#[tokio::test]
async fn no_slot_leak_across_repeated_failures() {
    let solver = Arc::new(MockSolver::new(vec![
        SolverResult::CrashedNonZero {
            code: 2,
            stderr: "bad".to_string(),
        },
        SolverResult::TimedOut {
            limit: Duration::from_secs(10),
        },
        SolverResult::ProcessError("gone".to_string()),
        completed("not json"),
        SolverResult::TimedOut {
            limit: Duration::from_secs(10),
        },
    ]));
    let gateway = gateway_with(solver.clone(), 3);

    for _ in 0..1000 {
        let response = gateway.handle(SAMPLE.as_bytes()).await;
        assert!(response.status >= 500);
    }

    assert_eq!(solver.calls(), 1000);
    assert_eq!(gateway.limiter().available(), 3);
    assert_eq!(gateway.stats().failed, 1000);
}

#[tokio::test]
async fn concurrent_requests_never_exceed_capacity() {
    let solver = Arc::new(
        MockSolver::always(completed("{}")).with_delay(Duration::from_millis(30)),
    );
    let gateway = Arc::new(gateway_with(solver.clone(), 3));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.handle(SAMPLE.as_bytes()).await.status })
        })
        .collect();
    let statuses = futures::future::join_all(tasks).await;

    assert!(statuses.into_iter().all(|s| s.unwrap() == 200));
    assert_eq!(solver.peak_concurrency(), 3);
    assert_eq!(gateway.limiter().available(), 3);
}

#[tokio::test]
async fn fourth_request_waits_behind_three_running() {
    let solver = Arc::new(
        MockSolver::always(completed("{}")).with_delay(Duration::from_millis(300)),
    );
    let gateway = Arc::new(gateway_with(solver.clone(), 3));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.handle(SAMPLE.as_bytes()).await.status })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(solver.calls(), 3);
    assert_eq!(gateway.limiter().in_flight(), 3);

    for task in futures::future::join_all(tasks).await {
        assert_eq!(task.unwrap(), 200);
    }
    assert_eq!(solver.calls(), 4);
    assert_eq!(solver.peak_concurrency(), 3);
}

#[tokio::test]
async fn stats_count_each_response_class() {
    let solver = Arc::new(MockSolver::new(vec![
        completed("{}"),
        SolverResult::ProcessError("gone".to_string()),
    ]));
    let gateway = gateway_with(solver, 3);

    gateway.handle(SAMPLE.as_bytes()).await;
    gateway.handle(b"").await;
    gateway.handle(SAMPLE.as_bytes()).await;

    let stats = gateway.stats();
    assert_eq!(stats.served, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn closed_limiter_turns_queued_requests_away() {
    let solver = Arc::new(
        MockSolver::always(completed("{}")).with_delay(Duration::from_millis(200)),
    );
    let gateway = Arc::new(gateway_with(solver.clone(), 1));

    let running = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.handle(SAMPLE.as_bytes()).await.status })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.handle(SAMPLE.as_bytes()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    gateway.limiter().close();

    let queued = queued.await.unwrap();
    assert_eq!(queued.status, 500);
    assert_eq!(
        queued.json().unwrap()["error"],
        "Unexpected error: execution limiter is closed"
    );
    assert_eq!(running.await.unwrap(), 200);
    assert_eq!(solver.calls(), 1);
}

#[tokio::test]
async fn missing_solver_binary_fails_without_taking_a_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solver");
    let limiter = ExecutionLimiter::new(1);
    let gateway = Gateway::new(
        Arc::new(ProcessSolver::new(&path, Duration::from_secs(10))),
        limiter.clone(),
        65536,
    );

    // With the only slot held elsewhere, a request that needed one would hang.
    let _held = limiter.acquire().await.unwrap();
    let response = tokio::time::timeout(Duration::from_secs(1), gateway.handle(SAMPLE.as_bytes()))
        .await
        .expect("missing solver should be reported without waiting for a slot");

    assert_eq!(response.status, 500);
    let error = response.json().unwrap()["error"].as_str().unwrap().to_string();
    assert_eq!(
        error,
        format!(
            "Solver not found at {}. Please compile the solver first.",
            path.display()
        )
    );
}
