//! Error types for task definitions.

use crate::run::domain::{RunDomainError, TaskName};
use thiserror::Error;

/// Errors returned while building or loading task definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// The task name is invalid.
    #[error(transparent)]
    InvalidName(#[from] RunDomainError),

    /// The cron expression cannot be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// Offending expression.
        expression: String,
        /// Parser message.
        reason: String,
    },

    /// An input's validation pattern is not a valid regular expression.
    #[error("input '{input}' has invalid validation pattern '{pattern}': {reason}")]
    InvalidInputPattern {
        /// Input name.
        input: String,
        /// Offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// A webhook trigger entry has no event name.
    #[error("task {task} declares a webhook trigger without an event name")]
    MissingEvent {
        /// Task declaring the trigger.
        task: TaskName,
    },

    /// Two definitions share a name.
    #[error("duplicate task definition: {0}")]
    DuplicateTask(TaskName),

    /// A task file could not be read.
    #[error("failed to read {path}: {reason}")]
    Io {
        /// File or directory path.
        path: String,
        /// Underlying I/O message.
        reason: String,
    },

    /// A task file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// File path.
        path: String,
        /// Parser message.
        reason: String,
    },
}
