//! One query module per table family.

pub mod checkers;
pub mod files;
pub mod reports;
pub mod run_history;
pub mod run_locks;
pub mod runs;
pub mod tasks;

use triage_core::errors::StorageError;

/// Map a rusqlite error into the storage error type.
pub(crate) fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::sqlite(e.to_string())
}
