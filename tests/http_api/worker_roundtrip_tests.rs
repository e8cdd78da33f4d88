//! A real worker loop talking to a served router over TCP.

use super::helpers::{LINT_TASK, json_request, request, run_id, send, start, text};
use async_trait::async_trait;
use axum::http::StatusCode;
use repowright::run::domain::{RepositoryOutcome, TaskResultState};
use repowright::run::services::DrainOutcome;
use repowright::worker::{
    adapters::HttpWorkSource,
    domain::WorkItem,
    ports::{Processor, ProcessorError},
    services::{Worker, WorkerSettings},
};
use rstest::rstest;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Merges a pull request in every targeted repository.
struct MergingProcessor;

#[async_trait]
impl Processor for MergingProcessor {
    async fn process(&self, item: &WorkItem) -> Result<Vec<RepositoryOutcome>, ProcessorError> {
        Ok(item
            .repositories
            .iter()
            .map(|repository| RepositoryOutcome::new(repository.as_str(), 1, TaskResultState::Merged))
            .collect())
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn worker_executes_scheduled_run_over_http() {
    let test_server = start(&[LINT_TASK]).await;
    let router = test_server.router.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener address");
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(test_server.server.serve(listener, async move {
        stop_rx.await.ok();
    }));

    let (_, created) = send(
        &router,
        json_request(
            "POST",
            "/api/v1/runs",
            &json!({ "taskName": "lint", "repositoryNames": ["acme/api", "acme/web"] }),
        ),
    )
    .await;
    let id = run_id(&created);

    let source = Arc::new(HttpWorkSource::new(&format!("http://{addr}")).expect("client builds"));
    let worker = Worker::new(
        source,
        Arc::new(MergingProcessor),
        WorkerSettings {
            parallel_executions: 1,
            poll_interval: Duration::from_millis(20),
            drain_log_interval: Duration::from_secs(1),
        },
    )
    .start();

    let run = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = send(&router, request("GET", &format!("/api/v1/runs/{id}"))).await;
            if text(&body, "/run/status") == Some("finished") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run finished before timeout");
    worker.stop().await;

    let (status, results) = send(
        &router,
        request("GET", &format!("/api/v1/taskResults?runId={id}")),
    )
    .await;
    stop_tx.send(()).expect("server still serving");
    let outcome = serving
        .await
        .expect("serve task joins")
        .expect("server stops cleanly");

    assert!(run.pointer("/run/error").is_none());
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.pointer("/page/totalItems"), Some(&json!(2)));
    let states: Vec<&str> = results
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|item| item.get("status")?.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(states, ["merged", "merged"]);
    assert_eq!(outcome, DrainOutcome::Drained);
}
