//! Startup reconciliation of task definitions with the ledger.

use crate::definition::domain::{TaskCatalog, TaskDefinition};
use crate::run::{
    domain::{NewRun, RunData, RunId, RunReason, TaskName, TaskRecord},
    ports::{RunLedger, RunLedgerError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// What a sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tasks seen for the first time.
    pub created: Vec<TaskName>,
    /// Tasks whose hash changed.
    pub changed: Vec<TaskName>,
    /// Tasks left as they were.
    pub unchanged: Vec<TaskName>,
    /// Runs scheduled for created or changed tasks.
    pub scheduled: Vec<RunId>,
}

/// Per-task persistence failures collected during a sync pass.
#[derive(Debug, Error)]
#[error("failed to sync {} task(s): {}", .failures.len(), render_failures(.failures))]
pub struct SyncError {
    /// What the pass managed before and after the failures.
    pub report: SyncReport,
    /// Failed tasks with their errors.
    pub failures: Vec<(TaskName, RunLedgerError)>,
}

fn render_failures(failures: &[(TaskName, RunLedgerError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

enum TaskChange {
    Created(Option<RunId>),
    Changed(Option<RunId>),
    Unchanged,
}

/// Reconciles loaded task definitions with ledger task records.
///
/// Definitions missing from the catalog leave their task records untouched.
pub struct SyncEngine<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    ledger: Arc<L>,
    clock: Arc<C>,
}

impl<L, C> SyncEngine<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    /// Creates a new sync engine.
    #[must_use]
    pub const fn new(ledger: Arc<L>, clock: Arc<C>) -> Self {
        Self { ledger, clock }
    }

    /// Syncs every definition in the catalog.
    ///
    /// Failures for one task do not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] listing every task the ledger rejected.
    pub async fn sync(&self, catalog: &TaskCatalog) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let mut failures = Vec::new();

        for definition in catalog.iter() {
            let name = definition.name().clone();
            match self.sync_task(definition).await {
                Ok(TaskChange::Created(run)) => {
                    report.created.push(name);
                    report.scheduled.extend(run);
                }
                Ok(TaskChange::Changed(run)) => {
                    report.changed.push(name);
                    report.scheduled.extend(run);
                }
                Ok(TaskChange::Unchanged) => report.unchanged.push(name),
                Err(err) => {
                    warn!(task = %name, error = %err, "failed to sync task");
                    failures.push((name, err));
                }
            }
        }

        info!(
            created = report.created.len(),
            changed = report.changed.len(),
            unchanged = report.unchanged.len(),
            failed = failures.len(),
            "task sync finished"
        );
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SyncError { report, failures })
        }
    }

    async fn sync_task(&self, definition: &TaskDefinition) -> Result<TaskChange, RunLedgerError> {
        let name = definition.name();
        let record = TaskRecord::new(name.clone(), definition.hash().clone())
            .with_active(definition.is_active());
        match self.ledger.find_task(name).await? {
            None => {
                let run = self.initial_run(definition, RunReason::New);
                let scheduled = self.ledger.insert_task(&record, run).await?;
                info!(task = %name, run_id = ?scheduled.map(RunId::value), "task created");
                Ok(TaskChange::Created(scheduled))
            }
            Some(existing) if existing.hash() != definition.hash() => {
                let run = self.initial_run(definition, RunReason::Changed);
                let scheduled = self.ledger.update_task(&record, run).await?;
                info!(task = %name, run_id = ?scheduled.map(RunId::value), "task changed");
                Ok(TaskChange::Changed(scheduled))
            }
            Some(_) => Ok(TaskChange::Unchanged),
        }
    }

    /// Builds the run for a new or changed task, or `None` when the task is
    /// inactive or needs inputs a sync cannot supply.
    fn initial_run(&self, definition: &TaskDefinition, reason: RunReason) -> Option<NewRun> {
        if !definition.is_active() {
            info!(task = %definition.name(), %reason, "not scheduling run, task is inactive");
            return None;
        }
        let run_data = RunData::new();
        if let Err(err) = definition.validate_inputs(&run_data) {
            info!(task = %definition.name(), %reason, error = %err, "not scheduling run, task requires inputs");
            return None;
        }
        Some(NewRun::new(definition.name().clone(), reason, self.clock.utc()).with_run_data(run_data))
    }
}
