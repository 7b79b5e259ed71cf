//! Database-layer errors.

use super::error_code::{self, TriageErrorCode};

/// Errors raised by the SQLite persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("Migration failed: {message}")]
    MigrationError { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },
}

impl StorageError {
    /// Wrap a rusqlite-level failure message.
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::SqliteError {
            message: message.into(),
        }
    }

    /// True if this error stems from a UNIQUE/PRIMARY KEY violation.
    ///
    /// Conflict handling (run locks, concurrent content inserts) keys off
    /// the SQLite message text because the error is wrapped as a string at
    /// the boundary.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::SqliteError { message } => {
                message.contains("UNIQUE constraint failed")
                    || message.contains("constraint violation")
            }
            _ => false,
        }
    }
}

impl TriageErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SqliteError { .. } => error_code::STORAGE_SQLITE,
            Self::MigrationError { .. } => error_code::STORAGE_MIGRATION,
            Self::NotFound { .. } => error_code::STORAGE_NOT_FOUND,
        }
    }
}
