//! Mass-store pipeline errors.
//!
//! The store path aggregates subsystem errors via `From` conversions, the
//! same way the analysis pipeline aggregates scan/parse/storage failures.

use super::error_code::{self, TriageErrorCode};
use super::{ConfigError, MetadataError, StorageError, TaskError};

/// An unresolvable or conflicting in-source review-status comment.
///
/// Collected during reconciliation and reported once, after the store's
/// transactional work is already durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongComment {
    pub file_path: String,
    pub line: u32,
    pub checker_name: String,
    pub reason: String,
}

impl std::fmt::Display for WrongComment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}",
            self.file_path, self.line, self.checker_name, self.reason
        )
    }
}

/// Errors that can abort (or, for review comments, fail-after-commit) a
/// mass store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Run '{run_name}' is locked by {locked_by}; the lock expires at {expires_at}")]
    RunLocked {
        run_name: String,
        locked_by: String,
        /// Unix seconds at which the lock becomes reusable.
        expires_at: i64,
    },

    #[error("Storing a new run would exceed the run limit of {limit} for this product")]
    RunLimitExceeded { limit: u64 },

    #[error("Run '{run_name}' exceeds the report limit of {limit}; nothing was stored")]
    ReportLimitExceeded { run_name: String, limit: u64 },

    #[error("Invalid upload archive: {message}")]
    Archive { message: String },

    #[error("Failed to register checker identities after {attempts} attempts: {message}")]
    CheckerRegistry { attempts: u32, message: String },

    #[error("The store succeeded, but {} review status comment(s) could not be applied", .comments.len())]
    WrongReviewStatusComments { comments: Vec<WrongComment> },

    #[error("Invalid store input: {message}")]
    InvalidInput { message: String },

    #[error("Store I/O error: {message}")]
    Io { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// The task observed and honored a cancel request. Distinguished from
    /// ordinary failures so bookkeeping can mark the task `cancelled`.
    #[error("Store cancelled")]
    Cancelled,
}

impl StoreError {
    /// Wrap an I/O failure with context.
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Io {
            message: format!("{context}: {err}"),
        }
    }
}

impl TriageErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RunLocked { .. } => error_code::STORE_RUN_LOCKED,
            Self::RunLimitExceeded { .. } => error_code::STORE_RUN_LIMIT,
            Self::ReportLimitExceeded { .. } => error_code::STORE_REPORT_LIMIT,
            Self::Archive { .. } => error_code::STORE_ARCHIVE,
            Self::CheckerRegistry { .. } => error_code::STORE_CHECKER_REGISTRY,
            Self::WrongReviewStatusComments { .. } => error_code::STORE_REVIEW_COMMENTS,
            Self::InvalidInput { .. } => error_code::STORE_INVALID_INPUT,
            Self::Io { .. } => error_code::STORE_IO,
            Self::Storage(e) => e.error_code(),
            Self::Metadata(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::Task(e) => e.error_code(),
            Self::Cancelled => error_code::CANCELLED,
        }
    }
}
