//! Per-repository outcomes recorded when a run completes.

use super::{ParseTaskResultStateError, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the pull request (or failure) a repository ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResultState {
    /// A pull request is open.
    Open,
    /// The pull request was closed without merging.
    Closed,
    /// The pull request was merged.
    Merged,
    /// Processing the repository failed.
    Error,
    /// The processor could not determine a state.
    Unknown,
}

impl TaskResultState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskResultState {
    type Error = ParseTaskResultStateError;

    fn try_from(value: &str) -> Result<Self, ParseTaskResultStateError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "merged" => Ok(Self::Merged),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseTaskResultStateError(value.to_owned())),
        }
    }
}

/// Outcome for one repository, as reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOutcome {
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Pull request state after processing.
    pub state: TaskResultState,
    /// Pull request URL, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    /// Repository-level error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepositoryOutcome {
    /// Creates an outcome without URL or error.
    #[must_use]
    pub fn new(repository_name: impl Into<String>, result: i32, state: TaskResultState) -> Self {
        Self {
            repository_name: repository_name.into(),
            result,
            state,
            pull_request_url: None,
            error: None,
        }
    }

    /// Sets the pull request URL.
    #[must_use]
    pub fn with_pull_request_url(mut self, url: impl Into<String>) -> Self {
        self.pull_request_url = Some(url.into());
        self
    }

    /// Sets the repository-level error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Completion payload applied to a running run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCompletion {
    /// Top-level execution error; `Some` fails the run.
    pub error: Option<String>,
    /// One entry per processed repository.
    pub outcomes: Vec<RepositoryOutcome>,
}

impl RunCompletion {
    /// Completion of a run that executed without a top-level error.
    #[must_use]
    pub const fn succeeded(outcomes: Vec<RepositoryOutcome>) -> Self {
        Self {
            error: None,
            outcomes,
        }
    }

    /// Completion of a run that failed.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            outcomes: Vec::new(),
        }
    }
}

/// Stored per-repository outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Ledger-assigned identifier.
    pub id: i64,
    /// Run the outcome belongs to.
    pub run_id: RunId,
    /// Full repository name.
    pub repository_name: String,
    /// Processor outcome code.
    pub result: i32,
    /// Pull request state after processing.
    pub state: TaskResultState,
    /// Pull request URL, if one exists.
    pub pull_request_url: Option<String>,
    /// Repository-level error, if any.
    pub error: Option<String>,
    /// Time the outcome was recorded.
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    /// Builds the stored form of a reported outcome.
    #[must_use]
    pub fn from_outcome(id: i64, run_id: RunId, outcome: RepositoryOutcome, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            run_id,
            repository_name: outcome.repository_name,
            result: outcome.result,
            state: outcome.state,
            pull_request_url: outcome.pull_request_url,
            error: outcome.error,
            created_at,
        }
    }
}
