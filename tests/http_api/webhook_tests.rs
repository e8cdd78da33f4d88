//! Webhook receivers: authentication, decoding and run creation.

use super::helpers::{
    DEPLOY_TASK, GITHUB_SECRET, GITLAB_TOKEN, LINT_TASK, poll_work, request, send, start,
    run_id, start_with, text,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use repowright::api::WebhookSecrets;
use repowright::api::webhooks::{
    GITHUB_DELIVERY_HEADER, GITHUB_EVENT_HEADER, GITHUB_SIGNATURE_HEADER, GITLAB_EVENT_HEADER,
    GITLAB_TOKEN_HEADER, sign_github_payload, verify_gitlab_token,
};
use rstest::rstest;
use serde_json::{Value, json};

fn push_payload(git_ref: &str) -> Vec<u8> {
    json!({
        "ref": git_ref,
        "after": "4f2c9e1",
        "checkout_sha": "4f2c9e1",
        "repository": { "full_name": "acme/api" },
    })
    .to_string()
    .into_bytes()
}

fn github_request(event: Option<&str>, signature: &str, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/github")
        .header("content-type", "application/json")
        .header(GITHUB_SIGNATURE_HEADER, signature)
        .header(GITHUB_DELIVERY_HEADER, "delivery-1");
    if let Some(name) = event {
        builder = builder.header(GITHUB_EVENT_HEADER, name);
    }
    builder.body(Body::from(body)).expect("request builds")
}

fn signed_github_push(git_ref: &str) -> Request<Body> {
    let body = push_payload(git_ref);
    let signature = sign_github_payload(GITHUB_SECRET, &body).expect("payload signs");
    github_request(Some("push"), &signature, body)
}

fn gitlab_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/gitlab")
        .header("content-type", "application/json")
        .header(GITLAB_TOKEN_HEADER, token)
        .header(GITLAB_EVENT_HEADER, "Push Hook")
        .body(Body::from(body))
        .expect("request builds")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn signed_github_push_creates_a_webhook_run() {
    let server = start(&[DEPLOY_TASK, LINT_TASK]).await;

    let (status, _) = send(&server.router, signed_github_push("refs/heads/main")).await;
    let work = poll_work(&server.router).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&work, "/task/name"), Some("deploy"));
    assert_eq!(text(&work, "/runData/sha"), Some("4f2c9e1"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn gitlab_push_with_token_creates_a_webhook_run() {
    let server = start(&[DEPLOY_TASK]).await;

    let (status, _) = send(
        &server.router,
        gitlab_request(GITLAB_TOKEN, push_payload("refs/heads/main")),
    )
    .await;
    let work = poll_work(&server.router).await;
    let run_uri = format!("/api/v1/runs/{}", run_id(&work));
    let (_, run) = send(&server.router, request("GET", &run_uri)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&work, "/runData/sha"), Some("4f2c9e1"));
    assert_eq!(text(&run, "/run/reason"), Some("webhook"));
}

#[rstest]
#[case::wrong_secret(sign_github_payload("other-secret", &push_payload("refs/heads/main")))]
#[case::not_hex(Some("sha256=zz".to_owned()))]
#[case::no_prefix(Some("deadbeef".to_owned()))]
#[tokio::test(flavor = "multi_thread")]
async fn bad_github_signature_is_rejected(#[case] signature: Option<String>) {
    let server = start(&[DEPLOY_TASK]).await;
    let header_value = signature.expect("signature computed");

    let (status, _) = send(
        &server.router,
        github_request(Some("push"), &header_value, push_payload("refs/heads/main")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_event_header_is_rejected() {
    let server = start(&[DEPLOY_TASK]).await;
    let body = push_payload("refs/heads/main");
    let signature = sign_github_payload(GITHUB_SECRET, &body).expect("payload signs");

    let (status, error) = send(&server.router, github_request(None, &signature, body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error.get("error").and_then(Value::as_u64), Some(0));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn wrong_gitlab_token_is_rejected() {
    let server = start(&[DEPLOY_TASK]).await;

    let (status, _) = send(
        &server.router,
        gitlab_request("not-the-token", push_payload("refs/heads/main")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn receivers_are_absent_without_secrets() {
    let server = start_with(&[DEPLOY_TASK], WebhookSecrets::default()).await;

    let (github_status, _) = send(&server.router, signed_github_push("refs/heads/main")).await;
    let (gitlab_status, _) = send(
        &server.router,
        gitlab_request(GITLAB_TOKEN, push_payload("refs/heads/main")),
    )
    .await;

    assert_eq!(github_status, StatusCode::NOT_FOUND);
    assert_eq!(gitlab_status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn push_to_other_branch_creates_no_run() {
    let server = start(&[DEPLOY_TASK]).await;

    let (status, _) = send(&server.router, signed_github_push("refs/heads/feature")).await;
    server.server.triggers().settle_deliveries().await;
    let (_, runs) = send(&server.router, request("GET", "/api/v1/runs")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.pointer("/page/totalItems"), Some(&json!(0)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn accepted_deliveries_are_scheduled_once_settled() {
    let server = start(&[DEPLOY_TASK]).await;

    let (status, _) = send(&server.router, signed_github_push("refs/heads/main")).await;
    server.server.triggers().settle_deliveries().await;
    let (_, runs) = send(&server.router, request("GET", "/api/v1/runs")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.pointer("/page/totalItems"), Some(&json!(1)));
    assert_eq!(text(&runs, "/result/0/reason"), Some("webhook"));
}

#[rstest]
#[case::same(GITLAB_TOKEN, true)]
#[case::different("gitlab-test-tokeX", false)]
#[case::prefix("gitlab-test", false)]
#[case::longer("gitlab-test-token-2", false)]
#[case::empty("", false)]
fn gitlab_tokens_must_match_exactly(#[case] received: &str, #[case] accepted: bool) {
    assert_eq!(verify_gitlab_token(GITLAB_TOKEN, received), accepted);
}
