//! Connection pragmas.

use rusqlite::Connection;
use triage_core::errors::StorageError;

/// Pragmas for the write connection: WAL for concurrent readers, NORMAL
/// sync (durable at checkpoint), foreign keys on so run deletion cascades.
pub fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA cache_size = -32000;",
    )
    .map_err(|e| StorageError::sqlite(format!("apply pragmas: {e}")))
}

/// Pragmas for read-only pool connections.
pub fn apply_read_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA query_only = ON;",
    )
    .map_err(|e| StorageError::sqlite(format!("apply read pragmas: {e}")))
}
