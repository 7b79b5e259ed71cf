//! Queries for the run_locks table.
//!
//! The lock row is the sole cross-process mutual-exclusion primitive for
//! stores; policy (grace period, refusal errors) lives in the store
//! crate's lock manager, this module is plain row access.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;

use super::db_err;

/// A run lock row.
#[derive(Debug, Clone)]
pub struct RunLockRow {
    pub name: String,
    pub locked_at: i64,
    pub username: Option<String>,
}

/// Insert a fresh lock row. Fails with a constraint violation if a row
/// for the name already exists (another store won the race).
pub fn insert_lock(
    conn: &Connection,
    name: &str,
    locked_at: i64,
    username: &str,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO run_locks (name, locked_at, username) VALUES (?1, ?2, ?3)",
        params![name, locked_at, username],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Read the lock row for a run name.
pub fn get_lock(conn: &Connection, name: &str) -> Result<Option<RunLockRow>, StorageError> {
    conn.prepare_cached("SELECT name, locked_at, username FROM run_locks WHERE name = ?1")
        .map_err(db_err)?
        .query_row(params![name], |row| {
            Ok(RunLockRow {
                name: row.get(0)?,
                locked_at: row.get(1)?,
                username: row.get(2)?,
            })
        })
        .optional()
        .map_err(db_err)
}

/// Take over an abandoned lock: refresh the timestamp and reassign the
/// holder, but only while the row is still expired (guards against a
/// concurrent takeover). Returns false if the row changed under us.
pub fn touch_expired_lock(
    conn: &Connection,
    name: &str,
    locked_at: i64,
    username: &str,
    expired_before: i64,
) -> Result<bool, StorageError> {
    let n = conn
        .execute(
            "UPDATE run_locks SET locked_at = ?1, username = ?2
             WHERE name = ?3 AND locked_at < ?4",
            params![locked_at, username, name, expired_before],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Delete the lock row unconditionally (logical ownership is the
/// caller's concern; concurrent acquisition already failed for others).
pub fn delete_lock(conn: &Connection, name: &str) -> Result<(), StorageError> {
    conn.execute("DELETE FROM run_locks WHERE name = ?1", params![name])
        .map_err(db_err)?;
    Ok(())
}

/// Delete all locks older than the cutoff; returns how many were removed.
pub fn delete_expired_locks(conn: &Connection, expired_before: i64) -> Result<u64, StorageError> {
    let n = conn
        .execute(
            "DELETE FROM run_locks WHERE locked_at < ?1",
            params![expired_before],
        )
        .map_err(db_err)?;
    Ok(n as u64)
}
