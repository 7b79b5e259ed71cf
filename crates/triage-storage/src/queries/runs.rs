//! Queries for the runs table.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;

use super::db_err;

/// A run row.
#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: i64,
    pub name: String,
    pub date: i64,
    /// Seconds; -1 while a store is in flight.
    pub duration: i64,
    pub can_delete: bool,
}

/// Insert a new run. Fails on duplicate name; callers wanting
/// create-or-reuse go through `find_by_name` first inside a transaction.
pub fn insert_run(conn: &Connection, name: &str, date: i64) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO runs (name, date, duration) VALUES (?1, ?2, -1)",
        params![name, date],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

/// Find a run by exact name.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<RunRow>, StorageError> {
    conn.prepare_cached("SELECT id, name, date, duration, can_delete FROM runs WHERE name = ?1")
        .map_err(db_err)?
        .query_row(params![name], map_run_row)
        .optional()
        .map_err(db_err)
}

/// Find a run by id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<RunRow>, StorageError> {
    conn.prepare_cached("SELECT id, name, date, duration, can_delete FROM runs WHERE id = ?1")
        .map_err(db_err)?
        .query_row(params![id], map_run_row)
        .optional()
        .map_err(db_err)
}

/// Query runs whose name contains the given filter (all runs when empty).
pub fn query_runs(conn: &Connection, name_filter: &str) -> Result<Vec<RunRow>, StorageError> {
    let pattern = format!("%{}%", name_filter.replace('%', "\\%").replace('_', "\\_"));
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, name, date, duration, can_delete FROM runs
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY date DESC",
        )
        .map_err(db_err)?;
    let rows = stmt.query_map(params![pattern], map_run_row).map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

/// Mark a run finished with the given duration (seconds) and refresh its
/// date to the store timestamp.
pub fn finish_run(
    conn: &Connection,
    id: i64,
    duration: i64,
    date: i64,
) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE runs SET duration = ?1, date = ?2 WHERE id = ?3",
        params![duration, date, id],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Delete a run; reports and histories cascade.
pub fn delete_run(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let n = conn
        .execute("DELETE FROM runs WHERE id = ?1 AND can_delete = 1", params![id])
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Count distinct run names (for the per-product run limit).
pub fn count_runs(conn: &Connection) -> Result<u64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(db_err)
}

fn map_run_row(row: &rusqlite::Row) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        duration: row.get(3)?,
        can_delete: row.get::<_, i64>(4)? != 0,
    })
}
