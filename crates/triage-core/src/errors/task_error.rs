//! Background task manager errors.

use super::error_code::{self, TriageErrorCode};
use super::StorageError;

/// Errors raised by the background task manager.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("No task with token '{token}'")]
    NotFound { token: String },

    #[error("Task queue is shut down; new tasks are not accepted")]
    QueueClosed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TriageErrorCode for TaskError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => error_code::TASK_NOT_FOUND,
            Self::QueueClosed => error_code::TASK_QUEUE_CLOSED,
            Self::Storage(e) => e.error_code(),
        }
    }
}
