//! HTTP interface of the server.
//!
//! The router exposes the worker claim/report endpoints, run submission and
//! inspection, the webhook receivers and a health check. Handlers are thin:
//! they decode, call [`SchedulingService`] or [`TriggerEngine`], and map
//! errors through [`error::ApiError`].

pub mod error;
mod runs;
pub mod webhooks;
pub mod wire;
mod work;

use crate::run::{ports::RunLedger, services::SchedulingService};
use crate::trigger::services::TriggerEngine;
use axum::Router;
use axum::routing::{get, post};
use mockable::Clock;
use std::sync::Arc;

/// Secrets authenticating webhook deliveries.
///
/// A provider's route is mounted only when its secret is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookSecrets {
    /// HMAC secret for GitHub signatures.
    pub github: Option<String>,
    /// Shared token for GitLab.
    pub gitlab: Option<String>,
}

/// Shared state of every handler.
pub struct ApiState<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    /// Scheduling service.
    pub scheduling: Arc<SchedulingService<L, C>>,
    /// Trigger engine receiving webhook deliveries.
    pub triggers: Arc<TriggerEngine<L, C>>,
    /// Webhook secrets.
    pub webhooks: Arc<WebhookSecrets>,
    /// Clock stamping webhook receipt.
    pub clock: Arc<C>,
}

impl<L, C> Clone for ApiState<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            scheduling: Arc::clone(&self.scheduling),
            triggers: Arc::clone(&self.triggers),
            webhooks: Arc::clone(&self.webhooks),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Builds the HTTP router.
pub fn router<L, C>(state: ApiState<L, C>) -> Router
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    let mut routes = Router::new()
        .route("/healthz", get(|| async { "UP" }))
        .route(
            "/api/v1/worker/work",
            get(work::get_work::<L, C>).post(work::report_work::<L, C>),
        )
        .route(
            "/api/v1/runs",
            get(runs::list_runs::<L, C>).post(runs::schedule_run::<L, C>),
        )
        .route(
            "/api/v1/runs/{run_id}",
            get(runs::get_run::<L, C>).delete(runs::delete_run::<L, C>),
        )
        .route("/api/v1/taskResults", get(runs::list_task_results::<L, C>));

    if state.webhooks.github.is_some() {
        routes = routes.route("/webhooks/github", post(webhooks::github::<L, C>));
    }
    if state.webhooks.gitlab.is_some() {
        routes = routes.route("/webhooks/gitlab", post(webhooks::gitlab::<L, C>));
    }
    routes.with_state(state)
}
