//! Shared helpers for HTTP integration tests.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use repowright::api::WebhookSecrets;
use repowright::clock::ManualClock;
use repowright::definition::adapters::parse_task_definition;
use repowright::definition::domain::TaskCatalog;
use repowright::run::{
    adapters::memory::InMemoryRunLedger,
    domain::{TaskHash, TaskRecord},
    ports::RunLedger,
    services::ShutdownSettings,
};
use repowright::server::Server;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// GitHub webhook secret configured on test servers.
pub const GITHUB_SECRET: &str = "github-test-secret";

/// GitLab webhook token configured on test servers.
pub const GITLAB_TOKEN: &str = "gitlab-test-token";

/// Task reacting to pushes on `main` from either provider.
pub const DEPLOY_TASK: &str = r#"
name = "deploy"

[trigger.webhook]

[[trigger.webhook.github]]
event = "push"
filters = ['.ref == "refs/heads/main"']
runData = { sha = ".after" }

[[trigger.webhook.gitlab]]
event = "Push Hook"
filters = ['.ref == "refs/heads/main"']
runData = { sha = ".checkout_sha" }
"#;

/// Task requiring a validated input.
pub const GREET_TASK: &str = r#"
name = "greet"

[[inputs]]
name = "greeting"
options = ["hello", "hi"]
"#;

/// Task with nothing but a name.
pub const LINT_TASK: &str = r#"name = "lint""#;

/// A bootstrapped server over an in-memory ledger.
pub struct TestServer {
    /// Router under test.
    pub router: Router,
    /// Ledger behind the router.
    pub ledger: Arc<InMemoryRunLedger>,
    /// Clock driving scheduling decisions.
    pub clock: Arc<ManualClock>,
    /// Server owning the services.
    pub server: Server<InMemoryRunLedger, ManualClock>,
}

/// Returns the instant test servers start at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
        .single()
        .expect("valid test timestamp")
}

/// Parses task files, hashing each by its position.
pub fn catalog(task_files: &[&str]) -> TaskCatalog {
    let definitions = task_files.iter().enumerate().map(|(index, text)| {
        parse_task_definition(text, TaskHash::new(format!("hash-{index}"))).expect("task file parses")
    });
    TaskCatalog::new(definitions).expect("unique task names")
}

/// Starts a server whose tasks are already known to the ledger, so no
/// new-task runs are queued at startup.
pub async fn start(task_files: &[&str]) -> TestServer {
    start_with(task_files, WebhookSecrets {
        github: Some(GITHUB_SECRET.to_owned()),
        gitlab: Some(GITLAB_TOKEN.to_owned()),
    })
    .await
}

/// Like [`start`], with explicit webhook secrets.
pub async fn start_with(task_files: &[&str], secrets: WebhookSecrets) -> TestServer {
    let tasks = catalog(task_files);
    let ledger = Arc::new(InMemoryRunLedger::new());
    for definition in tasks.iter() {
        let record = TaskRecord::new(definition.name().clone(), definition.hash().clone());
        ledger.insert_task(&record, None).await.expect("seed task record");
    }
    let clock = Arc::new(ManualClock::new(start_time()));
    let server = Server::bootstrap(
        Arc::clone(&ledger),
        tasks,
        Arc::clone(&clock),
        secrets,
        ShutdownSettings {
            check_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        },
    )
    .await
    .expect("server bootstraps");
    TestServer {
        router: server.router(),
        ledger,
        clock,
        server,
    }
}

/// Sends `request` and returns the status with the decoded body.
///
/// Non-JSON bodies are returned as a JSON string; empty bodies as `null`.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router never fails");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return (status, Value::Null);
    }
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Builds a bodiless request.
pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

/// Builds a JSON request.
pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Claims work until a run is handed out or the deadline passes.
pub async fn poll_work(router: &Router) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = send(router, request("GET", "/api/v1/worker/work")).await;
            assert_eq!(status, StatusCode::OK);
            if run_id(&body) != 0 {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("work handed out before timeout")
}

/// Reads the `runID` field of a response body, 0 when absent.
pub fn run_id(body: &Value) -> i64 {
    body.get("runID").and_then(Value::as_i64).unwrap_or_default()
}

/// Reads a string field of a response body by JSON pointer.
pub fn text<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    body.pointer(pointer).and_then(Value::as_str)
}
