//! Mapping of service errors onto HTTP responses.

use crate::run::services::SchedulingError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Stable numeric identifiers of client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorId {
    /// The named task is not loaded.
    TaskNotFound = 1000,
    /// Run data does not satisfy the task's inputs.
    InputMissing = 1001,
    /// The run does not exist.
    RunNotFound = 1002,
    /// The run is not a pending manual run.
    RunCannotDelete = 1003,
    /// The run was reported while not running.
    RunNotRunning = 1004,
}

impl ClientErrorId {
    /// Returns the numeric identifier.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns the HTTP status used for this error.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::TaskNotFound | Self::RunNotFound => StatusCode::NOT_FOUND,
            Self::InputMissing | Self::RunCannotDelete => StatusCode::BAD_REQUEST,
            Self::RunNotRunning => StatusCode::CONFLICT,
        }
    }
}

/// Error body returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error identifier; 0 for errors without one.
    pub error: u16,
    /// Human-readable message.
    pub message: String,
    /// Further details, such as every invalid input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Error returned by API handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A client error with a stable identifier.
    Client {
        /// Identifier.
        id: ClientErrorId,
        /// Message.
        message: String,
        /// Details.
        details: Vec<String>,
    },
    /// The request itself is malformed.
    BadRequest(String),
    /// An internal failure; details are logged, not returned.
    Internal,
}

impl ApiError {
    fn client(id: ClientErrorId, message: impl Into<String>) -> Self {
        Self::Client {
            id,
            message: message.into(),
            details: Vec::new(),
        }
    }
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::TaskNotFound(_) | SchedulingError::TaskInactive(_) => {
                Self::client(ClientErrorId::TaskNotFound, err.to_string())
            }
            SchedulingError::InvalidInputs(ref invalid) => Self::Client {
                id: ClientErrorId::InputMissing,
                message: err.to_string(),
                details: invalid.problems.iter().map(ToString::to_string).collect(),
            },
            SchedulingError::RunNotFound(_) => Self::client(ClientErrorId::RunNotFound, err.to_string()),
            SchedulingError::RunCannotDelete { .. } => {
                Self::client(ClientErrorId::RunCannotDelete, err.to_string())
            }
            SchedulingError::RunNotRunning { .. } => {
                Self::client(ClientErrorId::RunNotRunning, err.to_string())
            }
            SchedulingError::Ledger(ledger_err) => {
                error!(error = %ledger_err, "ledger operation failed");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Client { id, message, details } => (
                id.status(),
                ErrorBody {
                    error: id.code(),
                    message,
                    details,
                },
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: 0,
                    message,
                    details: Vec::new(),
                },
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: 0,
                    message: "internal server error".to_owned(),
                    details: Vec::new(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
