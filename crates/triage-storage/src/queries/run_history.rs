//! Queries for run histories, analysis info, and analyzer statistics.
//!
//! Run histories are append-only: one row per store operation. The only
//! post-insert mutation is nulling a prior colliding version tag.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;

use super::db_err;

/// A run history row.
#[derive(Debug, Clone)]
pub struct RunHistoryRow {
    pub id: i64,
    pub run_id: i64,
    pub version_tag: Option<String>,
    pub user_name: String,
    pub time: i64,
    pub analyzer_version: Option<String>,
    pub description: Option<String>,
}

/// An analyzer statistics row attached to a run history.
#[derive(Debug, Clone)]
pub struct AnalyzerStatisticsRow {
    pub id: i64,
    pub run_history_id: i64,
    pub analyzer_type: String,
    pub version: Option<String>,
    pub successful: i64,
    pub failed: i64,
    /// JSON array of repository-relative paths.
    pub failed_files: Option<String>,
    pub successful_files: Option<String>,
}

/// Insert a run history entry. A version tag colliding with a prior
/// history of the same run nulls the older tag (tags are unique per run,
/// latest store wins).
pub fn insert_history(
    conn: &Connection,
    run_id: i64,
    version_tag: Option<&str>,
    user_name: &str,
    time: i64,
    analyzer_version: Option<&str>,
    description: Option<&str>,
) -> Result<i64, StorageError> {
    if let Some(tag) = version_tag {
        conn.execute(
            "UPDATE run_histories SET version_tag = NULL
             WHERE run_id = ?1 AND version_tag = ?2",
            params![run_id, tag],
        )
        .map_err(db_err)?;
    }
    conn.execute(
        "INSERT INTO run_histories
            (run_id, version_tag, user_name, time, analyzer_version, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![run_id, version_tag, user_name, time, analyzer_version, description],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

/// Record one analyzer invocation command for a history entry.
pub fn insert_analysis_info(
    conn: &Connection,
    run_history_id: i64,
    analyzer_command: &str,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO analysis_info (run_history_id, analyzer_command) VALUES (?1, ?2)",
        params![run_history_id, analyzer_command],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

/// Record per-analyzer statistics for a history entry.
pub fn insert_analyzer_statistics(
    conn: &Connection,
    run_history_id: i64,
    analyzer_type: &str,
    version: Option<&str>,
    successful: i64,
    failed: i64,
    failed_files: Option<&str>,
    successful_files: Option<&str>,
) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO analyzer_statistics
            (run_history_id, analyzer_type, version, successful, failed,
             failed_files, successful_files)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run_history_id,
            analyzer_type,
            version,
            successful,
            failed,
            failed_files,
            successful_files
        ],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

/// Query history entries for a run, newest first.
pub fn query_by_run(conn: &Connection, run_id: i64) -> Result<Vec<RunHistoryRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, run_id, version_tag, user_name, time, analyzer_version, description
             FROM run_histories WHERE run_id = ?1 ORDER BY time DESC, id DESC",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![run_id], map_history_row)
        .map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

/// Find a history entry by (run, tag).
pub fn find_by_tag(
    conn: &Connection,
    run_id: i64,
    tag: &str,
) -> Result<Option<RunHistoryRow>, StorageError> {
    conn.prepare_cached(
        "SELECT id, run_id, version_tag, user_name, time, analyzer_version, description
         FROM run_histories WHERE run_id = ?1 AND version_tag = ?2",
    )
    .map_err(db_err)?
    .query_row(params![run_id, tag], map_history_row)
    .optional()
    .map_err(db_err)
}

/// Query analyzer statistics attached to a history entry.
pub fn query_statistics(
    conn: &Connection,
    run_history_id: i64,
) -> Result<Vec<AnalyzerStatisticsRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, run_history_id, analyzer_type, version, successful, failed,
                    failed_files, successful_files
             FROM analyzer_statistics WHERE run_history_id = ?1 ORDER BY analyzer_type",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![run_history_id], |row| {
            Ok(AnalyzerStatisticsRow {
                id: row.get(0)?,
                run_history_id: row.get(1)?,
                analyzer_type: row.get(2)?,
                version: row.get(3)?,
                successful: row.get(4)?,
                failed: row.get(5)?,
                failed_files: row.get(6)?,
                successful_files: row.get(7)?,
            })
        })
        .map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

fn map_history_row(row: &rusqlite::Row) -> rusqlite::Result<RunHistoryRow> {
    Ok(RunHistoryRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        version_tag: row.get(2)?,
        user_name: row.get(3)?,
        time: row.get(4)?,
        analyzer_version: row.get(5)?,
        description: row.get(6)?,
    })
}
