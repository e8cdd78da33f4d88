//! GitHub and GitLab webhook receivers.
//!
//! Requests are authenticated and decoded here; matching and scheduling
//! happen on a spawned task so the provider gets its answer immediately.

use super::ApiState;
use super::error::ApiError;
use crate::definition::domain::WebhookProvider;
use crate::run::ports::RunLedger;
use crate::trigger::domain::WebhookDelivery;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use mockable::Clock;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Header carrying the GitHub payload signature.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header carrying the GitHub event name.
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";
/// Header carrying the GitHub delivery identifier.
pub const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";
/// Header carrying the GitLab shared token.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";
/// Header carrying the GitLab event name.
pub const GITLAB_EVENT_HEADER: &str = "x-gitlab-event";
/// Header carrying the GitLab delivery identifier.
pub const GITLAB_DELIVERY_HEADER: &str = "x-gitlab-event-uuid";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Checks a GitHub `sha256=<hex>` signature of `body`.
#[must_use]
pub fn verify_github_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(encoded) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(encoded) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the GitHub signature header value for `body`.
#[must_use]
pub fn sign_github_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Compares a GitLab token in constant time.
#[must_use]
pub fn verify_gitlab_token(expected: &str, received: &str) -> bool {
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    header(headers, name).ok_or_else(|| ApiError::BadRequest(format!("missing header {name}")))
}

fn decode_payload(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(format!("invalid payload: {err}")))
}

/// `POST /webhooks/github`
pub(super) async fn github<L, C>(
    State(state): State<ApiState<L, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let secret = state
        .webhooks
        .github
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("GitHub webhooks are not configured".to_owned()))?;
    let signature = required_header(&headers, GITHUB_SIGNATURE_HEADER)?;
    if !verify_github_signature(secret, &body, signature) {
        warn!("rejected GitHub webhook with invalid signature");
        return Err(ApiError::BadRequest("invalid signature".to_owned()));
    }
    let event = required_header(&headers, GITHUB_EVENT_HEADER)?;
    let payload = decode_payload(&body)?;

    let mut delivery = WebhookDelivery::new(WebhookProvider::Github, event, payload, state.clock.utc());
    if let Some(id) = header(&headers, GITHUB_DELIVERY_HEADER) {
        delivery = delivery.with_delivery_id(id);
    }
    state.triggers.dispatch(delivery);
    Ok(StatusCode::OK)
}

/// `POST /webhooks/gitlab`
pub(super) async fn gitlab<L, C>(
    State(state): State<ApiState<L, C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let expected = state
        .webhooks
        .gitlab
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("GitLab webhooks are not configured".to_owned()))?;
    let token = required_header(&headers, GITLAB_TOKEN_HEADER)?;
    if !verify_gitlab_token(expected, token) {
        warn!("rejected GitLab webhook with invalid token");
        return Err(ApiError::BadRequest("invalid token".to_owned()));
    }
    let event = required_header(&headers, GITLAB_EVENT_HEADER)?;
    let payload = decode_payload(&body)?;

    let mut delivery = WebhookDelivery::new(WebhookProvider::Gitlab, event, payload, state.clock.utc());
    if let Some(id) = header(&headers, GITLAB_DELIVERY_HEADER) {
        delivery = delivery.with_delivery_id(id);
    }
    state.triggers.dispatch(delivery);
    Ok(StatusCode::OK)
}
