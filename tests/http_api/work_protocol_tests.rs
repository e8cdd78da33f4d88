//! Claim and report round trips against the worker endpoints.

use super::helpers::{GREET_TASK, LINT_TASK, json_request, request, run_id, send, start, text};
use axum::http::StatusCode;
use rstest::rstest;
use serde_json::{Value, json};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn idle_server_hands_out_no_work() {
    let server = start(&[LINT_TASK]).await;

    let (status, body) = send(&server.router, request("GET", "/api/v1/worker/work")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "runID": 0 }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claimed_work_carries_task_identity_and_run_data() {
    let server = start(&[GREET_TASK, LINT_TASK]).await;
    let (_, created) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({
                "taskName": "greet",
                "runData": { "greeting": "hello" },
                "repositoryNames": ["acme/api"],
            }),
        ),
    )
    .await;

    let (status, work) = send(&server.router, request("GET", "/api/v1/worker/work")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(run_id(&work), run_id(&created));
    assert_eq!(text(&work, "/task/name"), Some("greet"));
    assert_eq!(text(&work, "/task/hash"), Some("hash-0"));
    assert_eq!(text(&work, "/repositories/0"), Some("acme/api"));
    assert_eq!(text(&work, "/runData/greeting"), Some("hello"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn report_finishes_the_run_and_stores_results() {
    let server = start(&[LINT_TASK]).await;
    send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "lint" })),
    )
    .await;
    let (_, work) = send(&server.router, request("GET", "/api/v1/worker/work")).await;
    let id = run_id(&work);

    let (status, ack) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/worker/work",
            &json!({
                "runID": id,
                "taskResults": [
                    { "repositoryName": "acme/api", "result": 1, "status": "merged" },
                    {
                        "repositoryName": "acme/web",
                        "result": 2,
                        "status": "error",
                        "error": "clone failed",
                    },
                ],
            }),
        ),
    )
    .await;
    let (_, run) = send(&server.router, request("GET", &format!("/api/v1/runs/{id}"))).await;
    let (_, results) = send(
        &server.router,
        request("GET", &format!("/api/v1/taskResults?runId={id}&status=error")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "result": "ok" }));
    assert_eq!(text(&run, "/run/status"), Some("finished"));
    assert!(run.pointer("/run/finishedAt").is_some());
    assert_eq!(results.pointer("/page/totalItems"), Some(&json!(1)));
    assert_eq!(text(&results, "/result/0/repositoryName"), Some("acme/web"));
    assert_eq!(text(&results, "/result/0/error"), Some("clone failed"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reported_error_fails_the_run() {
    let server = start(&[LINT_TASK]).await;
    send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "lint" })),
    )
    .await;
    let (_, work) = send(&server.router, request("GET", "/api/v1/worker/work")).await;
    let id = run_id(&work);

    send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/worker/work",
            &json!({ "runID": id, "error": "processor crashed" }),
        ),
    )
    .await;
    let (_, run) = send(&server.router, request("GET", &format!("/api/v1/runs/{id}"))).await;

    assert_eq!(text(&run, "/run/status"), Some("failed"));
    assert_eq!(text(&run, "/run/error"), Some("processor crashed"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_report_is_a_conflict() {
    let server = start(&[LINT_TASK]).await;
    send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "lint" })),
    )
    .await;
    let (_, work) = send(&server.router, request("GET", "/api/v1/worker/work")).await;
    let report = json!({ "runID": run_id(&work) });

    let (first_status, _) =
        send(&server.router, json_request("POST", "/api/v1/worker/work", &report)).await;
    let (second_status, second) =
        send(&server.router, json_request("POST", "/api/v1/worker/work", &report)).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::CONFLICT);
    assert_eq!(second.get("error").and_then(Value::as_u64), Some(1004));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_pull_request_schedules_a_follow_up() {
    let server = start(&[LINT_TASK]).await;
    send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "lint" })),
    )
    .await;
    let (_, work) = send(&server.router, request("GET", "/api/v1/worker/work")).await;

    send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/worker/work",
            &json!({
                "runID": run_id(&work),
                "taskResults": [{
                    "repositoryName": "acme/api",
                    "result": 1,
                    "status": "open",
                    "pullRequestUrl": "https://github.com/acme/api/pull/7",
                }],
            }),
        ),
    )
    .await;
    let (_, pending) = send(&server.router, request("GET", "/api/v1/runs?status=pending")).await;
    let (_, idle) = send(&server.router, request("GET", "/api/v1/worker/work")).await;

    assert_eq!(pending.pointer("/page/totalItems"), Some(&json!(1)));
    assert_eq!(text(&pending, "/result/0/reason"), Some("next"));
    assert_eq!(
        text(&pending, "/result/0/scheduleAfter"),
        Some("2026-03-03T12:00:00Z")
    );
    assert_eq!(run_id(&idle), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_report_is_rejected() {
    let server = start(&[LINT_TASK]).await;

    let (status, _) = send(
        &server.router,
        json_request("POST", "/api/v1/worker/work", &json!({ "taskResults": "nope" })),
    )
    .await;

    assert!(status.is_client_error());
}
