//! Port through which a worker claims and reports work.

use crate::run::domain::{RunCompletion, RunId};
use crate::worker::domain::WorkItem;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for work source operations.
pub type WorkSourceResult<T> = Result<T, WorkSourceError>;

/// Claim/report contract between a worker and the scheduling server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Claims the next unit of work.
    ///
    /// Returns `None` when the server has nothing due.
    ///
    /// # Errors
    ///
    /// Returns [`WorkSourceError`] when the server cannot be reached or
    /// answers with an error.
    async fn next_work(&self) -> WorkSourceResult<Option<WorkItem>>;

    /// Reports the completion of a claimed run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkSourceError`] when the report is not accepted.
    async fn report(&self, run_id: RunId, completion: RunCompletion) -> WorkSourceResult<()>;
}

/// Errors returned by work source implementations.
#[derive(Debug, Clone, Error)]
pub enum WorkSourceError {
    /// The server answered with a non-success status.
    #[error("server rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The server's answer could not be understood.
    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl WorkSourceError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
