//! Claim, report and submission operations over the run ledger.

use super::ClaimGate;
use crate::definition::domain::{InputValidationError, TaskCatalog, TaskDefinition};
use crate::run::{
    domain::{
        NewRun, Page, PageRequest, Run, RunCompletion, RunData, RunFilter, RunId,
        RunReason, RunStatus, TaskHash, TaskName, TaskResult, TaskResultFilter, TaskResultState,
    },
    ports::{RunLedger, RunLedgerError},
};
use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failure message recorded when a claimed run's task is not loaded.
pub const UNKNOWN_TASK_MESSAGE: &str = "task is not loaded on the server";

/// Failure message recorded when a claimed run's task is inactive.
pub const INACTIVE_TASK_MESSAGE: &str = "task is inactive";

/// Follow-up delay, in hours, for open pull requests of auto-merging tasks.
const AUTO_MERGE_FOLLOW_UP_HOURS: i64 = 1;

/// Follow-up delay, in hours, for open pull requests awaiting review.
const REVIEW_FOLLOW_UP_HOURS: i64 = 24;

/// Request payload for scheduling a run through the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRunRequest {
    task_name: String,
    run_data: RunData,
    repository_names: Vec<String>,
    schedule_after: Option<DateTime<Utc>>,
}

impl ScheduleRunRequest {
    /// Creates a request for `task_name`, due immediately, targeting all
    /// repositories.
    #[must_use]
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            run_data: RunData::new(),
            repository_names: Vec::new(),
            schedule_after: None,
        }
    }

    /// Sets run data.
    #[must_use]
    pub fn with_run_data(mut self, run_data: RunData) -> Self {
        self.run_data = run_data;
        self
    }

    /// Restricts the run to the given repositories.
    #[must_use]
    pub fn with_repository_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.repository_names = names.into_iter().collect();
        self
    }

    /// Delays the run until `schedule_after`.
    #[must_use]
    pub const fn with_schedule_after(mut self, schedule_after: DateTime<Utc>) -> Self {
        self.schedule_after = Some(schedule_after);
        self
    }
}

/// A claimed run handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAssignment {
    /// The claimed run, now running.
    pub run: Run,
    /// Hash of the task definition the server holds.
    pub task_hash: TaskHash,
}

/// Service-level errors for scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// No task definition with this name is loaded.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The task is loaded but deactivated.
    #[error("task is inactive: {0}")]
    TaskInactive(TaskName),

    /// Run data does not satisfy the task's inputs.
    #[error(transparent)]
    InvalidInputs(#[from] InputValidationError),

    /// The run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// The run was reported while not running.
    #[error("run {id} is {status}, expected running")]
    RunNotRunning {
        /// Reported run.
        id: RunId,
        /// Its current status.
        status: RunStatus,
    },

    /// Only pending manual runs may be deleted.
    #[error("run {id} cannot be deleted: it is {status} with reason {reason}")]
    RunCannotDelete {
        /// Run targeted for deletion.
        id: RunId,
        /// Its current status.
        status: RunStatus,
        /// Its creation reason.
        reason: RunReason,
    },

    /// Ledger operation failed.
    #[error(transparent)]
    Ledger(RunLedgerError),
}

impl From<RunLedgerError> for SchedulingError {
    fn from(err: RunLedgerError) -> Self {
        match err {
            RunLedgerError::RunNotFound(id) => Self::RunNotFound(id),
            RunLedgerError::RunNotRunning { id, status } => Self::RunNotRunning { id, status },
            other => Self::Ledger(other),
        }
    }
}

/// Result type for scheduling operations.
pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Scheduling orchestration service.
///
/// Owns the claim/report protocol, run submission and ledger inspection.
/// Every run creation goes through [`Self::enqueue`], which validates inputs
/// against the loaded definition before the ledger sees the run.
pub struct SchedulingService<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    ledger: Arc<L>,
    catalog: Arc<TaskCatalog>,
    gate: Arc<ClaimGate>,
    clock: Arc<C>,
}

impl<L, C> SchedulingService<L, C>
where
    L: RunLedger,
    C: Clock + Send + Sync,
{
    /// Creates a new scheduling service.
    #[must_use]
    pub const fn new(
        ledger: Arc<L>,
        catalog: Arc<TaskCatalog>,
        gate: Arc<ClaimGate>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            gate,
            clock,
        }
    }

    /// Returns the loaded task catalog.
    #[must_use]
    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Claims the next due run.
    ///
    /// Returns `None` when nothing is due or the server is shutting down.
    /// A claimed run whose task is no longer loaded, or is inactive, is
    /// failed on the spot and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::Ledger`] when the ledger fails.
    pub async fn get_work(&self) -> SchedulingResult<Option<WorkAssignment>> {
        if self.gate.is_closed() {
            return Ok(None);
        }

        let Some(run) = self.ledger.claim_next(self.clock.utc()).await? else {
            return Ok(None);
        };

        let definition = match self.catalog.get(run.task_name()) {
            Some(definition) if definition.is_active() => definition,
            Some(_) => return self.fail_claimed(&run, INACTIVE_TASK_MESSAGE).await,
            None => return self.fail_claimed(&run, UNKNOWN_TASK_MESSAGE).await,
        };

        info!(run_id = %run.id(), task = %run.task_name(), reason = %run.reason(), "run claimed");
        Ok(Some(WorkAssignment {
            task_hash: definition.hash().clone(),
            run,
        }))
    }

    /// Records the outcome of a running run and schedules its follow-up.
    ///
    /// A follow-up that cannot be scheduled is logged; the report itself has
    /// already been committed.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::RunNotFound`] for an unknown run and
    /// [`SchedulingError::RunNotRunning`] when the run already completed.
    pub async fn report_work(&self, id: RunId, completion: RunCompletion) -> SchedulingResult<Run> {
        let has_open_pull_request = completion
            .outcomes
            .iter()
            .any(|outcome| outcome.state == TaskResultState::Open);

        let run = self
            .ledger
            .complete_run(id, completion, self.clock.utc())
            .await?;
        info!(
            run_id = %run.id(),
            task = %run.task_name(),
            status = %run.status(),
            error = run.error().unwrap_or_default(),
            "run reported"
        );

        if let Some(follow_up) = self.follow_up_for(&run, has_open_pull_request) {
            let reason = follow_up.reason();
            match self.enqueue(follow_up).await {
                Ok(next_id) => {
                    info!(run_id = %run.id(), next_run_id = %next_id, %reason, "follow-up run scheduled");
                }
                Err(err) => {
                    warn!(run_id = %run.id(), %reason, error = %err, "failed to schedule follow-up run");
                }
            }
        }
        Ok(run)
    }

    /// Schedules a manual run.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::TaskNotFound`] for an unknown task,
    /// [`SchedulingError::TaskInactive`] for a deactivated one and
    /// [`SchedulingError::InvalidInputs`] listing every input problem.
    pub async fn schedule_run(&self, request: ScheduleRunRequest) -> SchedulingResult<RunId> {
        let task_name = TaskName::new(request.task_name.as_str())
            .map_err(|_| SchedulingError::TaskNotFound(request.task_name.clone()))?;
        let schedule_after = request.schedule_after.unwrap_or_else(|| self.clock.utc());
        let run = NewRun::new(task_name, RunReason::Manual, schedule_after)
            .with_repository_names(request.repository_names)
            .with_run_data(request.run_data);
        self.enqueue(run).await
    }

    /// Schedules a run after validating it against the loaded definition.
    ///
    /// Identical pending runs coalesce; see [`RunLedger::schedule_run`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::TaskNotFound`] for an unknown task,
    /// [`SchedulingError::TaskInactive`] for a deactivated one and
    /// [`SchedulingError::InvalidInputs`] when inputs do not validate.
    pub async fn enqueue(&self, run: NewRun) -> SchedulingResult<RunId> {
        let definition = self.definition(run.task_name())?;
        if !definition.is_active() {
            return Err(SchedulingError::TaskInactive(run.task_name().clone()));
        }
        definition.validate_inputs(run.run_data())?;
        let id = self.ledger.schedule_run(run).await?;
        Ok(id)
    }

    /// Lists runs, newest schedule time first.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::Ledger`] when the ledger fails.
    pub async fn list_runs(&self, filter: &RunFilter, page: PageRequest) -> SchedulingResult<Page<Run>> {
        Ok(self.ledger.list_runs(filter, page).await?)
    }

    /// Returns a run by ID.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::RunNotFound`] when the run does not exist.
    pub async fn get_run(&self, id: RunId) -> SchedulingResult<Run> {
        self.ledger
            .find_run(id)
            .await?
            .ok_or(SchedulingError::RunNotFound(id))
    }

    /// Deletes a pending manual run.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::RunNotFound`] when the run does not exist
    /// and [`SchedulingError::RunCannotDelete`] when it is not a pending
    /// manual run.
    pub async fn delete_run(&self, id: RunId) -> SchedulingResult<()> {
        let run = self.get_run(id).await?;
        if run.status() != RunStatus::Pending || run.reason() != RunReason::Manual {
            return Err(SchedulingError::RunCannotDelete {
                id,
                status: run.status(),
                reason: run.reason(),
            });
        }
        self.ledger.delete_run(id).await?;
        info!(run_id = %id, "run deleted");
        Ok(())
    }

    /// Lists task results, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::Ledger`] when the ledger fails.
    pub async fn list_task_results(
        &self,
        filter: &TaskResultFilter,
        page: PageRequest,
    ) -> SchedulingResult<Page<TaskResult>> {
        Ok(self.ledger.list_task_results(filter, page).await?)
    }

    async fn fail_claimed(&self, run: &Run, message: &str) -> SchedulingResult<Option<WorkAssignment>> {
        warn!(run_id = %run.id(), task = %run.task_name(), reason = message, "claimed run cannot be executed");
        self.ledger
            .complete_run(run.id(), RunCompletion::failed(message), self.clock.utc())
            .await?;
        Ok(None)
    }

    fn definition(&self, name: &TaskName) -> SchedulingResult<&TaskDefinition> {
        self.catalog
            .get(name)
            .ok_or_else(|| SchedulingError::TaskNotFound(name.as_str().to_owned()))
    }

    /// Cron runs are followed by the next tick; any other run is revisited
    /// while a pull request it left is still open.
    fn follow_up_for(&self, run: &Run, has_open_pull_request: bool) -> Option<NewRun> {
        let definition = self
            .catalog
            .get(run.task_name())
            .filter(|definition| definition.is_active())?;

        if run.reason() == RunReason::Cron {
            let next_tick = definition.trigger().cron.as_ref()?.next_after(run.schedule_after())?;
            return Some(NewRun::new(run.task_name().clone(), RunReason::Cron, next_tick));
        }

        if !has_open_pull_request {
            return None;
        }
        let delay = Duration::hours(if definition.auto_merge() {
            AUTO_MERGE_FOLLOW_UP_HOURS
        } else {
            REVIEW_FOLLOW_UP_HOURS
        });
        Some(
            NewRun::new(run.task_name().clone(), RunReason::Next, run.schedule_after() + delay)
                .with_repository_names(run.repository_names().iter().cloned())
                .with_run_data(run.run_data().clone()),
        )
    }
}
