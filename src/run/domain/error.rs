//! Error types for run domain validation and parsing.

use super::{RunId, RunStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning run ledger values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunDomainError {
    /// The task name is empty after trimming.
    #[error("task name must not be empty")]
    EmptyTaskName,

    /// The requested state transition is not part of the run lifecycle.
    #[error("invalid run transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        /// Run being transitioned.
        run_id: RunId,
        /// Current status.
        from: RunStatus,
        /// Requested status.
        to: RunStatus,
    },
}

/// Error returned while parsing run statuses from persistence or queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown run status: {0}")]
pub struct ParseRunStatusError(pub String);

/// Error returned while parsing run reasons from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown run reason: {0}")]
pub struct ParseRunReasonError(pub String);

/// Error returned while parsing task result states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task result state: {0}")]
pub struct ParseTaskResultStateError(pub String);
