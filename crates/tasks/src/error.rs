//! Task invocation error types.

use thiserror::Error;

/// Errors that can occur while invoking an external task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No handler registered for the task.
    #[error("Task not registered: {0}")]
    NotRegistered(String),

    /// The handler ran and reported a failure.
    #[error("{error_type}: {message}")]
    Failed { error_type: String, message: String },

    /// The request could not be built from the run's context.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The handler did not answer in time.
    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl TaskError {
    /// Short machine-readable error class, reported as `Error` in error info.
    pub fn error_type(&self) -> &str {
        match self {
            TaskError::NotRegistered(_) => "TaskNotRegistered",
            TaskError::Failed { error_type, .. } => error_type,
            TaskError::InvalidRequest(_) => "InvalidRequest",
            TaskError::Http(_) => "HttpError",
            TaskError::Timeout(_) => "Timeout",
            TaskError::Json(_) => "JsonError",
        }
    }

    /// Human-readable cause, reported as `Cause` in error info.
    pub fn cause(&self) -> String {
        match self {
            TaskError::Failed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(e: reqwest::Error) -> Self {
        TaskError::Http(e.to_string())
    }
}
