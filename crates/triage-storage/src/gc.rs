//! Garbage collection for triage.db.
//!
//! Removes rows nothing references anymore:
//! - `files` rows no report, path position, event, or extended-data row
//!   points at;
//! - `file_contents` rows no surviving file references;
//! - `run_locks` rows past the expiry cutoff (crashed stores).
//!
//! Checker rows are never collected; reports hold foreign keys into them
//! and identities are append-only.

use rusqlite::{params, Connection};
use serde::Serialize;

use triage_core::errors::StorageError;

/// Report of what was cleaned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcReport {
    pub total_deleted: u64,
    pub per_table: Vec<TableCleanup>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCleanup {
    pub table: String,
    pub deleted: u64,
}

/// Run the full garbage collection pass inside a single transaction.
///
/// `lock_cutoff` is the unix timestamp before which lock rows count as
/// expired (now minus the configured grace period).
pub fn collect_garbage(conn: &Connection, lock_cutoff: i64) -> Result<GcReport, StorageError> {
    let start = std::time::Instant::now();
    let mut report = GcReport::default();

    // RAII transaction: auto-rollback on drop, commit on success.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StorageError::sqlite(format!("gc begin: {e}")))?;

    collect_inner(&tx, lock_cutoff, &mut report)?;

    tx.commit()
        .map_err(|e| StorageError::sqlite(e.to_string()))?;

    report.duration_ms = start.elapsed().as_millis() as u64;
    report.total_deleted = report.per_table.iter().map(|t| t.deleted).sum();
    Ok(report)
}

fn collect_inner(
    tx: &rusqlite::Transaction<'_>,
    lock_cutoff: i64,
    report: &mut GcReport,
) -> Result<(), StorageError> {
    let orphan_files = tx
        .execute(
            "DELETE FROM files WHERE id NOT IN (
                SELECT file_id FROM reports
                UNION SELECT file_id FROM bug_path_positions
                UNION SELECT file_id FROM bug_path_events
                UNION SELECT file_id FROM extended_report_data
             )",
            [],
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    push(report, "files", orphan_files);

    let orphan_contents = tx
        .execute(
            "DELETE FROM file_contents WHERE content_hash NOT IN (
                SELECT content_hash FROM files
             )",
            [],
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    push(report, "file_contents", orphan_contents);

    let expired_locks = tx
        .execute(
            "DELETE FROM run_locks WHERE locked_at < ?1",
            params![lock_cutoff],
        )
        .map_err(|e| StorageError::sqlite(e.to_string()))?;
    push(report, "run_locks", expired_locks);

    Ok(())
}

fn push(report: &mut GcReport, table: &str, deleted: usize) {
    if deleted > 0 {
        tracing::debug!(table, deleted, "gc cleaned table");
    }
    report.per_table.push(TableCleanup {
        table: table.to_string(),
        deleted: deleted as u64,
    });
}
