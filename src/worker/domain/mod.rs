//! Units of work as seen by a worker.

use crate::run::domain::{RepositoryOutcome, RunCompletion, RunData, RunId, TaskHash, TaskName};

/// A claimed run handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Claimed run.
    pub run_id: RunId,
    /// Task to execute.
    pub task_name: TaskName,
    /// Hash of the definition the server holds.
    pub task_hash: TaskHash,
    /// Repositories to restrict execution to; empty means all.
    pub repositories: Vec<String>,
    /// Run data.
    pub run_data: RunData,
}

/// Outcome of executing one work item, sent back to the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Run the result belongs to.
    pub run_id: RunId,
    /// Task that was executed.
    pub task_name: TaskName,
    /// Execution-level error, if the processor failed.
    pub error: Option<String>,
    /// Per-repository outcomes.
    pub outcomes: Vec<RepositoryOutcome>,
}

impl ExecutionResult {
    /// Result of a successful execution.
    #[must_use]
    pub fn succeeded(item: &WorkItem, outcomes: Vec<RepositoryOutcome>) -> Self {
        Self {
            run_id: item.run_id,
            task_name: item.task_name.clone(),
            error: None,
            outcomes,
        }
    }

    /// Result of a failed execution.
    #[must_use]
    pub fn failed(item: &WorkItem, error: impl Into<String>) -> Self {
        Self {
            run_id: item.run_id,
            task_name: item.task_name.clone(),
            error: Some(error.into()),
            outcomes: Vec::new(),
        }
    }

    /// Converts the result into the completion reported to the server.
    #[must_use]
    pub fn into_completion(self) -> RunCompletion {
        RunCompletion {
            error: self.error,
            outcomes: self.outcomes,
        }
    }
}
