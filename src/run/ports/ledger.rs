//! Ledger port for task records, runs and task results.

use crate::run::domain::{
    NewRun, Page, PageRequest, Run, RunCompletion, RunDomainError, RunFilter, RunId, RunStatus,
    TaskName, TaskRecord, TaskResult, TaskResultFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for ledger operations.
pub type RunLedgerResult<T> = Result<T, RunLedgerError>;

/// Durable store of tasks, runs and task results.
///
/// Every run transition is a single atomic read-modify-write; multi-row
/// writes (task plus initial run, completion plus results) are transactional.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Finds a task record by name.
    ///
    /// Returns `None` when the task has never been synced.
    async fn find_task(&self, name: &TaskName) -> RunLedgerResult<Option<TaskRecord>>;

    /// Inserts a task record and, optionally, its first run in one
    /// transaction.
    ///
    /// Returns the ID of the scheduled run when one was requested.
    ///
    /// # Errors
    ///
    /// Returns [`RunLedgerError::DuplicateTask`] when the name already exists.
    async fn insert_task(
        &self,
        task: &TaskRecord,
        initial_run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>>;

    /// Replaces the hash and active flag of the task named by `task` and,
    /// optionally, schedules a run in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RunLedgerError::TaskNotFound`] when the task does not exist.
    async fn update_task(
        &self,
        task: &TaskRecord,
        run: Option<NewRun>,
    ) -> RunLedgerResult<Option<RunId>>;

    /// Schedules a run.
    ///
    /// When an identical pending run exists (see [`NewRun::coalesces_with`])
    /// its ID is returned instead and its schedule time is moved to the
    /// requested one.
    async fn schedule_run(&self, run: NewRun) -> RunLedgerResult<RunId>;

    /// Atomically claims the next due run.
    ///
    /// Selects the pending run with the smallest `schedule_after <= now`,
    /// ties broken by the smallest ID, and marks it running. Returns `None`
    /// when nothing is due.
    async fn claim_next(&self, now: DateTime<Utc>) -> RunLedgerResult<Option<Run>>;

    /// Completes a running run and records its per-repository outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`RunLedgerError::RunNotFound`] for an unknown ID and
    /// [`RunLedgerError::RunNotRunning`] when the run is not running.
    async fn complete_run(
        &self,
        id: RunId,
        completion: RunCompletion,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Run>;

    /// Fails every running run with `message`, returning their IDs.
    async fn fail_running_runs(
        &self,
        message: &str,
        now: DateTime<Utc>,
    ) -> RunLedgerResult<Vec<RunId>>;

    /// Counts runs currently running.
    async fn count_running(&self) -> RunLedgerResult<u64>;

    /// Finds a run by ID.
    async fn find_run(&self, id: RunId) -> RunLedgerResult<Option<Run>>;

    /// Lists runs, newest schedule time first.
    async fn list_runs(&self, filter: &RunFilter, page: PageRequest) -> RunLedgerResult<Page<Run>>;

    /// Deletes a run together with its task results.
    ///
    /// # Errors
    ///
    /// Returns [`RunLedgerError::RunNotFound`] for an unknown ID.
    async fn delete_run(&self, id: RunId) -> RunLedgerResult<()>;

    /// Lists task results, newest first.
    async fn list_task_results(
        &self,
        filter: &TaskResultFilter,
        page: PageRequest,
    ) -> RunLedgerResult<Page<TaskResult>>;
}

/// Errors returned by ledger implementations.
#[derive(Debug, Clone, Error)]
pub enum RunLedgerError {
    /// A task with the same name already exists.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskName),

    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskName),

    /// The run was not found.
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    /// The run is not in the running state.
    #[error("run {id} is {status}, expected running")]
    RunNotRunning {
        /// Run that was reported.
        id: RunId,
        /// Its current status.
        status: RunStatus,
    },

    /// A stored value violated a domain rule.
    #[error(transparent)]
    Domain(#[from] RunDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl RunLedgerError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
