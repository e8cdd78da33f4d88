//! Port that executes a unit of work.

use crate::run::domain::{RepositoryOutcome, TaskName};
use crate::worker::domain::WorkItem;
use async_trait::async_trait;
use thiserror::Error;

/// Executes a task against its repositories.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Runs `item` and returns one outcome per processed repository.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when the task could not be executed at all.
    async fn process(&self, item: &WorkItem) -> Result<Vec<RepositoryOutcome>, ProcessorError>;
}

/// Errors returned by processors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The worker has no definition for the task.
    #[error("task {0} is not known to this worker")]
    UnknownTask(TaskName),

    /// The worker's definition differs from the server's.
    #[error("task {task} hash mismatch: server has {expected}, worker has {actual}")]
    HashMismatch {
        /// Task name.
        task: TaskName,
        /// Hash reported by the server.
        expected: String,
        /// Hash of the local definition.
        actual: String,
    },

    /// The execution failed.
    #[error("execution failed: {0}")]
    Execution(String),
}
