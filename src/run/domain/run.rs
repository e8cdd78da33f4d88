//! Run aggregate and its lifecycle state machine.

use super::{ParseRunReasonError, ParseRunStatusError, RunDomainError, RunId, TaskName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named string parameters attached to a run.
///
/// A sorted map keeps the persisted form stable, which the ledger relies on
/// when coalescing identical pending runs.
pub type RunData = BTreeMap<String, String>;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by a worker and executing.
    Running,
    /// Reported without a top-level error.
    Finished,
    /// Reported with an error, recovered after a crash, or abandoned at
    /// shutdown.
    Failed,
}

impl RunStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` when no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Returns `true` when moving from `self` to `target` is a valid
    /// lifecycle transition.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running) | (Self::Running, Self::Finished | Self::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = ParseRunStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseRunStatusError(value.to_owned())),
        }
    }
}

/// Why a run was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunReason {
    /// Scheduled through the API.
    Manual,
    /// Task seen for the first time during sync.
    New,
    /// Task definition hash changed since the last sync.
    Changed,
    /// Inbound webhook matched a trigger.
    Webhook,
    /// Cron schedule tick.
    Cron,
    /// Follow-up for pull requests that are still open.
    Next,
}

impl RunReason {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::New => "new",
            Self::Changed => "changed",
            Self::Webhook => "webhook",
            Self::Cron => "cron",
            Self::Next => "next",
        }
    }
}

impl fmt::Display for RunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RunReason {
    type Error = ParseRunReasonError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "new" => Ok(Self::New),
            "changed" => Ok(Self::Changed),
            "webhook" => Ok(Self::Webhook),
            "cron" => Ok(Self::Cron),
            "next" => Ok(Self::Next),
            _ => Err(ParseRunReasonError(value.to_owned())),
        }
    }
}

/// A run that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    task_name: TaskName,
    reason: RunReason,
    schedule_after: DateTime<Utc>,
    repository_names: Vec<String>,
    run_data: RunData,
}

impl NewRun {
    /// Creates a run request targeting every repository the task matches.
    #[must_use]
    pub const fn new(task_name: TaskName, reason: RunReason, schedule_after: DateTime<Utc>) -> Self {
        Self {
            task_name,
            reason,
            schedule_after,
            repository_names: Vec::new(),
            run_data: RunData::new(),
        }
    }

    /// Restricts the run to the given repositories.
    #[must_use]
    pub fn with_repository_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.repository_names = names.into_iter().collect();
        self
    }

    /// Attaches run data.
    #[must_use]
    pub fn with_run_data(mut self, run_data: RunData) -> Self {
        self.run_data = run_data;
        self
    }

    /// Returns the task name.
    #[must_use]
    pub const fn task_name(&self) -> &TaskName {
        &self.task_name
    }

    /// Returns the creation reason.
    #[must_use]
    pub const fn reason(&self) -> RunReason {
        self.reason
    }

    /// Returns the earliest time the run may be claimed.
    #[must_use]
    pub const fn schedule_after(&self) -> DateTime<Utc> {
        self.schedule_after
    }

    /// Returns the targeted repositories; empty means all.
    #[must_use]
    pub fn repository_names(&self) -> &[String] {
        &self.repository_names
    }

    /// Returns the run data.
    #[must_use]
    pub const fn run_data(&self) -> &RunData {
        &self.run_data
    }

    /// Returns `true` when `run` is a pending run with the same identity.
    ///
    /// Identity covers task, reason, repositories and run data. The schedule
    /// time is not part of it.
    #[must_use]
    pub fn coalesces_with(&self, run: &Run) -> bool {
        run.status == RunStatus::Pending
            && run.task_name == self.task_name
            && run.reason == self.reason
            && run.repository_names == self.repository_names
            && run.run_data == self.run_data
    }
}

/// Run aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    id: RunId,
    task_name: TaskName,
    status: RunStatus,
    reason: RunReason,
    schedule_after: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    repository_names: Vec<String>,
    run_data: RunData,
}

/// Parameter object for reconstructing a persisted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRunData {
    /// Persisted run identifier.
    pub id: RunId,
    /// Persisted task name.
    pub task_name: TaskName,
    /// Persisted status.
    pub status: RunStatus,
    /// Persisted creation reason.
    pub reason: RunReason,
    /// Persisted schedule time.
    pub schedule_after: DateTime<Utc>,
    /// Persisted claim time, if any.
    pub started_at: Option<DateTime<Utc>>,
    /// Persisted completion time, if any.
    pub finished_at: Option<DateTime<Utc>>,
    /// Persisted failure message, if any.
    pub error: Option<String>,
    /// Persisted repository restriction.
    pub repository_names: Vec<String>,
    /// Persisted run data.
    pub run_data: RunData,
}

impl Run {
    /// Materialises a pending run from a request and a ledger-assigned ID.
    #[must_use]
    pub fn pending(id: RunId, request: NewRun) -> Self {
        Self {
            id,
            task_name: request.task_name,
            status: RunStatus::Pending,
            reason: request.reason,
            schedule_after: request.schedule_after,
            started_at: None,
            finished_at: None,
            error: None,
            repository_names: request.repository_names,
            run_data: request.run_data,
        }
    }

    /// Reconstructs a run from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedRunData) -> Self {
        Self {
            id: data.id,
            task_name: data.task_name,
            status: data.status,
            reason: data.reason,
            schedule_after: data.schedule_after,
            started_at: data.started_at,
            finished_at: data.finished_at,
            error: data.error,
            repository_names: data.repository_names,
            run_data: data.run_data,
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Returns the task name.
    #[must_use]
    pub const fn task_name(&self) -> &TaskName {
        &self.task_name
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the creation reason.
    #[must_use]
    pub const fn reason(&self) -> RunReason {
        self.reason
    }

    /// Returns the earliest time the run may be claimed.
    #[must_use]
    pub const fn schedule_after(&self) -> DateTime<Utc> {
        self.schedule_after
    }

    /// Returns the claim time.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the completion time.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the failure message.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the targeted repositories; empty means all.
    #[must_use]
    pub fn repository_names(&self) -> &[String] {
        &self.repository_names
    }

    /// Returns the run data.
    #[must_use]
    pub const fn run_data(&self) -> &RunData {
        &self.run_data
    }

    /// Returns `true` when the run is pending and due at `now`.
    #[must_use]
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Pending && self.schedule_after <= now
    }

    /// Moves a pending run's schedule time.
    ///
    /// Only pending runs are rescheduled; other runs are left untouched and
    /// `false` is returned.
    pub fn reschedule(&mut self, schedule_after: DateTime<Utc>) -> bool {
        if self.status != RunStatus::Pending {
            return false;
        }
        self.schedule_after = schedule_after;
        true
    }

    /// Claims the run for execution.
    ///
    /// # Errors
    ///
    /// Returns [`RunDomainError::InvalidTransition`] unless the run is
    /// pending.
    pub fn claim(&mut self, at: DateTime<Utc>) -> Result<(), RunDomainError> {
        self.transition_to(RunStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Records the run's outcome.
    ///
    /// A run without an error finishes; a run with an error fails and keeps
    /// the message.
    ///
    /// # Errors
    ///
    /// Returns [`RunDomainError::InvalidTransition`] unless the run is
    /// running.
    pub fn complete(&mut self, error: Option<String>, at: DateTime<Utc>) -> Result<(), RunDomainError> {
        let target = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };
        self.transition_to(target)?;
        self.finished_at = Some(at);
        self.error = error;
        Ok(())
    }

    fn transition_to(&mut self, target: RunStatus) -> Result<(), RunDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(RunDomainError::InvalidTransition {
                run_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}
