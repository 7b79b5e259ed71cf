//! Queries for reports and their child rows.
//!
//! Child rows (path positions, path events, extended data, annotations)
//! follow delete-and-recreate semantics per report id; they are never
//! merged with prior rows.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;
use triage_core::types::{
    CheckerIdentity, DetectionStatus, ExtendedDataKind, ReviewStatus, StoredReportData,
};

use super::db_err;

/// Fields for inserting a fresh report row.
#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub run_id: i64,
    pub file_id: i64,
    pub bug_id: &'a str,
    pub checker_id: i64,
    pub line: u32,
    pub column: u32,
    pub message: &'a str,
    pub path_length: usize,
    pub detection_status: DetectionStatus,
    pub review_status: ReviewStatus,
    pub review_status_author: Option<&'a str>,
    pub review_status_message: Option<&'a str>,
    pub review_status_date: Option<i64>,
    pub review_status_is_in_source: bool,
    pub detected_at: i64,
    pub fixed_at: Option<i64>,
}

/// Insert a report row; returns its id.
pub fn insert_report(conn: &Connection, report: &NewReport<'_>) -> Result<i64, StorageError> {
    conn.prepare_cached(
        "INSERT INTO reports
            (run_id, file_id, bug_id, checker_id, line, col, message, path_length,
             detection_status, review_status, review_status_author,
             review_status_message, review_status_date, review_status_is_in_source,
             detected_at, fixed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )
    .map_err(db_err)?
    .execute(params![
        report.run_id,
        report.file_id,
        report.bug_id,
        report.checker_id,
        report.line,
        report.column,
        report.message,
        report.path_length as i64,
        report.detection_status.as_str(),
        report.review_status.as_str(),
        report.review_status_author,
        report.review_status_message,
        report.review_status_date,
        report.review_status_is_in_source as i64,
        report.detected_at,
        report.fixed_at,
    ])
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

/// Insert one bug path position (control-flow step without a message).
pub fn insert_bug_path_position(
    conn: &Connection,
    report_id: i64,
    idx: usize,
    file_id: i64,
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO bug_path_positions
            (report_id, idx, file_id, start_line, start_col, end_line, end_col)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .map_err(db_err)?
    .execute(params![report_id, idx as i64, file_id, start_line, start_col, end_line, end_col])
    .map_err(db_err)?;
    Ok(())
}

/// Insert one bug path event (diagnostic step).
pub fn insert_bug_path_event(
    conn: &Connection,
    report_id: i64,
    idx: usize,
    file_id: i64,
    line: u32,
    column: u32,
    message: &str,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO bug_path_events (report_id, idx, file_id, line, col, message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .map_err(db_err)?
    .execute(params![report_id, idx as i64, file_id, line, column, message])
    .map_err(db_err)?;
    Ok(())
}

/// Insert one extended data row (note, macro expansion, or fixit).
pub fn insert_extended_data(
    conn: &Connection,
    report_id: i64,
    kind: ExtendedDataKind,
    file_id: i64,
    line: u32,
    column: u32,
    message: &str,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO extended_report_data (report_id, kind, file_id, line, col, message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .map_err(db_err)?
    .execute(params![report_id, kind.as_str(), file_id, line, column, message])
    .map_err(db_err)?;
    Ok(())
}

/// Insert one report annotation.
pub fn insert_annotation(
    conn: &Connection,
    report_id: i64,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO report_annotations (report_id, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(report_id, key) DO UPDATE SET value = excluded.value",
    )
    .map_err(db_err)?
    .execute(params![report_id, key, value])
    .map_err(db_err)?;
    Ok(())
}

const REPORT_SELECT: &str = "SELECT r.id, r.run_id, r.file_id, f.filepath, r.bug_id,
        c.analyzer_name, c.checker_name, r.line, r.col, r.message,
        r.detection_status, r.review_status, r.detected_at, r.fixed_at
     FROM reports r
     JOIN files f ON f.id = r.file_id
     JOIN checkers c ON c.id = r.checker_id";

/// All reports of a run (the run's current state, bug-hash indexed by the
/// reconciliation engine).
pub fn query_by_run(conn: &Connection, run_id: i64) -> Result<Vec<StoredReportData>, StorageError> {
    let sql = format!("{REPORT_SELECT} WHERE r.run_id = ?1 ORDER BY r.id");
    let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
    let rows = stmt.query_map(params![run_id], map_stored_report).map_err(db_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
}

/// Find one report by id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<StoredReportData>, StorageError> {
    let sql = format!("{REPORT_SELECT} WHERE r.id = ?1");
    conn.prepare_cached(&sql)
        .map_err(db_err)?
        .query_row(params![id], map_stored_report)
        .optional()
        .map_err(db_err)
}

/// Transition a report's detection status, stamping `fixed_at` only if it
/// is not already set (closing is sticky).
pub fn transition_detection_status(
    conn: &Connection,
    report_id: i64,
    status: DetectionStatus,
    fixed_at: Option<i64>,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "UPDATE reports SET detection_status = ?1,
                fixed_at = COALESCE(fixed_at, ?2)
         WHERE id = ?3",
    )
    .map_err(db_err)?
    .execute(params![status.as_str(), fixed_at, report_id])
    .map_err(db_err)?;
    Ok(())
}

/// Overwrite a report's review status fields and `fixed_at`.
#[allow(clippy::too_many_arguments)]
pub fn update_review_status(
    conn: &Connection,
    report_id: i64,
    status: ReviewStatus,
    author: Option<&str>,
    message: Option<&str>,
    date: Option<i64>,
    is_in_source: bool,
    fixed_at: Option<i64>,
) -> Result<bool, StorageError> {
    let n = conn
        .prepare_cached(
            "UPDATE reports SET review_status = ?1, review_status_author = ?2,
                    review_status_message = ?3, review_status_date = ?4,
                    review_status_is_in_source = ?5, fixed_at = ?6
             WHERE id = ?7",
        )
        .map_err(db_err)?
        .execute(params![
            status.as_str(),
            author,
            message,
            date,
            is_in_source as i64,
            fixed_at,
            report_id
        ])
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Delete report rows by id; children cascade.
pub fn delete_reports(conn: &Connection, report_ids: &[i64]) -> Result<(), StorageError> {
    let mut stmt = conn
        .prepare_cached("DELETE FROM reports WHERE id = ?1")
        .map_err(db_err)?;
    for id in report_ids {
        stmt.execute(params![id]).map_err(db_err)?;
    }
    Ok(())
}

/// Optional criteria for bulk report removal.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub detection_statuses: Vec<DetectionStatus>,
    pub review_statuses: Vec<ReviewStatus>,
    pub checker_names: Vec<String>,
}

/// Delete reports of the given runs matching the filter. Returns how many
/// rows were removed.
pub fn delete_matching(
    conn: &Connection,
    run_ids: &[i64],
    filter: &ReportFilter,
) -> Result<u64, StorageError> {
    let mut deleted = 0u64;
    for run_id in run_ids {
        let reports = query_by_run(conn, *run_id)?;
        let ids: Vec<i64> = reports
            .iter()
            .filter(|r| {
                (filter.detection_statuses.is_empty()
                    || filter.detection_statuses.contains(&r.detection_status))
                    && (filter.review_statuses.is_empty()
                        || filter.review_statuses.contains(&r.review_status))
                    && (filter.checker_names.is_empty()
                        || filter.checker_names.contains(&r.checker.checker_name))
            })
            .map(|r| r.id)
            .collect();
        deleted += ids.len() as u64;
        delete_reports(conn, &ids)?;
    }
    Ok(deleted)
}

/// Count reports currently attached to a run.
pub fn count_by_run(conn: &Connection, run_id: i64) -> Result<u64, StorageError> {
    conn.prepare_cached("SELECT COUNT(*) FROM reports WHERE run_id = ?1")
        .map_err(db_err)?
        .query_row(params![run_id], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(db_err)
}

/// Detection status histogram for a run.
pub fn detection_status_counts(
    conn: &Connection,
    run_id: i64,
) -> Result<Vec<(DetectionStatus, u64)>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT detection_status, COUNT(*) FROM reports
             WHERE run_id = ?1 GROUP BY detection_status",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(db_err)?;
    let mut out = Vec::new();
    for row in rows {
        let (status_text, count) = row.map_err(db_err)?;
        if let Some(status) = DetectionStatus::parse(&status_text) {
            out.push((status, count as u64));
        }
    }
    Ok(out)
}

fn map_stored_report(row: &rusqlite::Row) -> rusqlite::Result<StoredReportData> {
    let detection_text: String = row.get(10)?;
    let review_text: String = row.get(11)?;
    Ok(StoredReportData {
        id: row.get(0)?,
        run_id: row.get(1)?,
        file_id: row.get(2)?,
        file_path: row.get(3)?,
        bug_id: row.get(4)?,
        checker: CheckerIdentity::new(
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ),
        line: row.get::<_, i64>(7)? as u32,
        column: row.get::<_, i64>(8)? as u32,
        message: row.get(9)?,
        detection_status: DetectionStatus::parse(&detection_text)
            .unwrap_or(DetectionStatus::Unresolved),
        review_status: ReviewStatus::parse(&review_text).unwrap_or(ReviewStatus::Unreviewed),
        detected_at: row.get(12)?,
        fixed_at: row.get(13)?,
    })
}
