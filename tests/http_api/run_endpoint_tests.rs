//! Run submission, inspection and deletion over HTTP.

use super::helpers::{
    GREET_TASK, LINT_TASK, json_request, request, run_id, send, start, text,
};
use axum::http::StatusCode;
use rstest::rstest;
use serde_json::{Value, json};

fn error_code(body: &Value) -> Option<u64> {
    body.get("error").and_then(Value::as_u64)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_up() {
    let server = start(&[LINT_TASK]).await;

    let (status, body) = send(&server.router, request("GET", "/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("UP".to_owned()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scheduled_run_can_be_fetched() {
    let server = start(&[LINT_TASK]).await;

    let (status, created) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({ "taskName": "lint", "repositoryNames": ["acme/api"] }),
        ),
    )
    .await;
    let id = run_id(&created);
    let (fetched_status, fetched) =
        send(&server.router, request("GET", &format!("/api/v1/runs/{id}"))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(id > 0);
    assert_eq!(fetched_status, StatusCode::OK);
    assert_eq!(text(&fetched, "/run/taskName"), Some("lint"));
    assert_eq!(text(&fetched, "/run/status"), Some("pending"));
    assert_eq!(text(&fetched, "/run/reason"), Some("manual"));
    assert_eq!(text(&fetched, "/run/repositoryNames/0"), Some("acme/api"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_task_is_a_not_found_client_error() {
    let server = start(&[LINT_TASK]).await;

    let (status, body) = send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "ghost" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some(1000));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_inputs_list_every_problem() {
    let server = start(&[GREET_TASK]).await;

    let (missing_status, missing) = send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "greet" })),
    )
    .await;
    let (wrong_status, wrong) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({ "taskName": "greet", "runData": { "greeting": "yo" } }),
        ),
    )
    .await;
    let (ok_status, _) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({ "taskName": "greet", "runData": { "greeting": "hi" } }),
        ),
    )
    .await;

    assert_eq!(missing_status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&missing), Some(1001));
    assert_eq!(
        text(&missing, "/details/0"),
        Some("input 'greeting' is required")
    );
    assert_eq!(wrong_status, StatusCode::BAD_REQUEST);
    assert_eq!(
        text(&wrong, "/details/0"),
        Some("input 'greeting' must be one of: hello, hi")
    );
    assert_eq!(ok_status, StatusCode::OK);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_run_is_a_not_found_client_error() {
    let server = start(&[LINT_TASK]).await;

    let (status, body) = send(&server.router, request("GET", "/api/v1/runs/4242")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some(1002));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_pending_manual_runs_can_be_deleted() {
    let server = start(&[LINT_TASK]).await;
    let (_, first) = send(
        &server.router,
        json_request("POST", "/api/v1/runs", &json!({ "taskName": "lint" })),
    )
    .await;
    let (_, second) = send(
        &server.router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({ "taskName": "lint", "repositoryNames": ["acme/web"] }),
        ),
    )
    .await;
    let claimed = send(&server.router, request("GET", "/api/v1/worker/work")).await.1;
    assert_eq!(run_id(&claimed), run_id(&first));

    let (running_status, running) = send(
        &server.router,
        request("DELETE", &format!("/api/v1/runs/{}", run_id(&first))),
    )
    .await;
    let (pending_status, pending) = send(
        &server.router,
        request("DELETE", &format!("/api/v1/runs/{}", run_id(&second))),
    )
    .await;
    let (gone_status, _) = send(
        &server.router,
        request("GET", &format!("/api/v1/runs/{}", run_id(&second))),
    )
    .await;

    assert_eq!(running_status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&running), Some(1003));
    assert_eq!(pending_status, StatusCode::OK);
    assert_eq!(pending, json!({}));
    assert_eq!(gone_status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn run_listing_filters_by_status_and_pages() {
    let server = start(&[LINT_TASK]).await;
    for repository in ["acme/a", "acme/b", "acme/c"] {
        let (status, _) = send(
            &server.router,
            json_request(
                "POST",
                "/api/v1/runs",
                &json!({ "taskName": "lint", "repositoryNames": [repository] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    send(&server.router, request("GET", "/api/v1/worker/work")).await;

    let (status, pending) = send(
        &server.router,
        request("GET", "/api/v1/runs?status=pending&task=lint&page=1&limit=1"),
    )
    .await;
    let (_, mixed) = send(
        &server.router,
        request("GET", "/api/v1/runs?status=pending,running"),
    )
    .await;
    let (bad_status, _) = send(&server.router, request("GET", "/api/v1/runs?status=queued")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.pointer("/page/totalItems"), Some(&json!(2)));
    assert_eq!(pending.pointer("/page/nextPage"), Some(&json!(2)));
    assert_eq!(pending.pointer("/page/totalPages"), Some(&json!(2)));
    assert_eq!(
        pending.pointer("/result").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );
    assert_eq!(mixed.pointer("/page/totalItems"), Some(&json!(3)));
    assert_eq!(bad_status, StatusCode::BAD_REQUEST);
}
