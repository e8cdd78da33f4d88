//! Server bootstrap and lifecycle.
//!
//! Startup order matters: orphaned runs are failed before the task catalog
//! is synced, triggers are compiled before the listener opens, and on stop
//! the drain runs while the listener is still serving reports.

use crate::api::{self, ApiState, WebhookSecrets};
use crate::config::{ConfigError, ServerConfig};
use crate::definition::{adapters::load_task_catalog, domain::{DefinitionError, TaskCatalog}};
use crate::run::{
    adapters::sqlite::SqliteRunLedger,
    ports::{RunLedger, RunLedgerError},
    services::{ClaimGate, DrainOutcome, SchedulingService, ShutdownCoordinator, ShutdownSettings, SyncEngine},
};
use crate::trigger::{
    matcher::TriggerCompileError,
    services::{EnqueueError, TriggerEngine},
};
use axum::Router;
use mockable::{Clock, DefaultClock};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task definitions could not be loaded.
    #[error(transparent)]
    Definitions(#[from] DefinitionError),

    /// The ledger could not be opened.
    #[error(transparent)]
    Ledger(#[from] RunLedgerError),

    /// A webhook trigger expression is invalid.
    #[error(transparent)]
    Triggers(#[from] TriggerCompileError),

    /// The listener failed.
    #[error("listener error: {0}")]
    Io(String),
}

/// A bootstrapped server, ready to serve.
pub struct Server<L, C>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    router: Router,
    scheduling: Arc<SchedulingService<L, C>>,
    triggers: Arc<TriggerEngine<L, C>>,
    coordinator: ShutdownCoordinator<L, C>,
}

impl<L, C> Server<L, C>
where
    L: RunLedger + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Recovers orphaned runs, syncs `catalog`, compiles triggers and builds
    /// the router.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Triggers`] when a trigger expression does not
    /// compile. Recovery and sync failures are logged and startup continues.
    pub async fn bootstrap(
        ledger: Arc<L>,
        catalog: TaskCatalog,
        clock: Arc<C>,
        webhooks: WebhookSecrets,
        shutdown: ShutdownSettings,
    ) -> Result<Self, ServerError> {
        let gate = Arc::new(ClaimGate::new());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&ledger), Arc::clone(&gate), Arc::clone(&clock), shutdown);
        coordinator.recover_orphaned_runs().await;

        let catalog = Arc::new(catalog);
        match SyncEngine::new(Arc::clone(&ledger), Arc::clone(&clock)).sync(&catalog).await {
            Ok(report) => info!(
                created = report.created.len(),
                changed = report.changed.len(),
                unchanged = report.unchanged.len(),
                scheduled = report.scheduled.len(),
                "task definitions synced"
            ),
            Err(err) => {
                for (task, cause) in &err.failures {
                    error!(task = %task, error = %cause, "failed to sync task definition");
                }
            }
        }

        let scheduling = Arc::new(SchedulingService::new(ledger, catalog, gate, Arc::clone(&clock)));
        let triggers = Arc::new(TriggerEngine::compile(Arc::clone(&scheduling), Arc::clone(&clock))?);
        match triggers.schedule_cron_runs().await {
            Ok(ids) => info!(count = ids.len(), "cron runs queued"),
            Err(EnqueueError::Scheduling { failures, .. }) => {
                for (task, cause) in failures {
                    warn!(task = %task, error = %cause, "failed to queue cron run");
                }
            }
            Err(err) => warn!(error = %err, "failed to queue cron runs"),
        }

        let router = api::router(ApiState {
            scheduling: Arc::clone(&scheduling),
            triggers: Arc::clone(&triggers),
            webhooks: Arc::new(webhooks),
            clock,
        });
        Ok(Self {
            router,
            scheduling,
            triggers,
            coordinator,
        })
    }

    /// Returns a clone of the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Returns the scheduling service.
    #[must_use]
    pub const fn scheduling(&self) -> &Arc<SchedulingService<L, C>> {
        &self.scheduling
    }

    /// Returns the trigger engine.
    #[must_use]
    pub const fn triggers(&self) -> &Arc<TriggerEngine<L, C>> {
        &self.triggers
    }

    /// Serves until `stop` resolves, then waits for accepted webhook
    /// deliveries, drains running runs while still accepting reports, and
    /// finally closes the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] when the listener fails.
    pub async fn serve<F>(self, listener: TcpListener, stop: F) -> Result<DrainOutcome, ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            router,
            triggers,
            coordinator,
            ..
        } = self;
        let (outcome_tx, outcome_rx) = oneshot::channel();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                stop.await;
                triggers.settle_deliveries().await;
                let outcome = coordinator.drain().await;
                if outcome_tx.send(outcome).is_err() {
                    warn!("drain outcome dropped");
                }
            })
            .await
            .map_err(|err| ServerError::Io(err.to_string()))?;

        let outcome = outcome_rx.await.map_err(|err| ServerError::Io(err.to_string()))?;
        info!(?outcome, "server stopped");
        Ok(outcome)
    }
}

/// Runs the server described by `config` until Ctrl-C.
///
/// # Errors
///
/// Returns [`ServerError`] when startup or the listener fails.
pub async fn run_server(config: ServerConfig) -> Result<DrainOutcome, ServerError> {
    let addr = config.socket_addr()?;
    let ledger = Arc::new(SqliteRunLedger::open(&config.database_path)?);
    let catalog = load_task_catalog(&config.tasks_dir)?;
    info!(tasks = catalog.len(), dir = %config.tasks_dir, "task definitions loaded");

    let webhooks = WebhookSecrets {
        github: config.github_webhook_secret.clone(),
        gitlab: config.gitlab_webhook_token.clone(),
    };
    let server = Server::bootstrap(
        ledger,
        catalog,
        Arc::new(DefaultClock),
        webhooks,
        config.shutdown_settings(),
    )
    .await?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| ServerError::Io(err.to_string()))?;
    info!(%addr, "server listening");
    server.serve(listener, shutdown_signal()).await
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
