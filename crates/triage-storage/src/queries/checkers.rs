//! Queries for the checkers table — stable (analyzer, checker) identities.
//!
//! Append-only outside explicit severity upgrades; rows are never deleted
//! because reports hold foreign keys into them.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;
use triage_core::types::{CheckerIdentity, Severity};

use super::db_err;

/// A checker row.
#[derive(Debug, Clone)]
pub struct CheckerRow {
    pub id: i64,
    pub analyzer_name: String,
    pub checker_name: String,
    pub severity: Severity,
}

/// Insert a checker identity if absent; concurrent inserts of the same
/// pair resolve via the unique constraint.
pub fn insert_checker(
    conn: &Connection,
    ident: &CheckerIdentity,
    severity: Severity,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO checkers (analyzer_name, checker_name, severity)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(analyzer_name, checker_name) DO NOTHING",
        params![ident.analyzer_name, ident.checker_name, severity.as_str()],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Find a checker by identity.
pub fn find_checker(
    conn: &Connection,
    ident: &CheckerIdentity,
) -> Result<Option<CheckerRow>, StorageError> {
    conn.prepare_cached(
        "SELECT id, analyzer_name, checker_name, severity
         FROM checkers WHERE analyzer_name = ?1 AND checker_name = ?2",
    )
    .map_err(db_err)?
    .query_row(params![ident.analyzer_name, ident.checker_name], map_checker_row)
    .optional()
    .map_err(db_err)
}

/// Find a checker by id.
pub fn find_checker_by_id(conn: &Connection, id: i64) -> Result<Option<CheckerRow>, StorageError> {
    conn.prepare_cached(
        "SELECT id, analyzer_name, checker_name, severity FROM checkers WHERE id = ?1",
    )
    .map_err(db_err)?
    .query_row(params![id], map_checker_row)
    .optional()
    .map_err(db_err)
}

/// Upgrade the default severity of a checker. Maintenance operation, not
/// part of the store path.
pub fn update_severity(
    conn: &Connection,
    ident: &CheckerIdentity,
    severity: Severity,
) -> Result<bool, StorageError> {
    let n = conn
        .execute(
            "UPDATE checkers SET severity = ?1
             WHERE analyzer_name = ?2 AND checker_name = ?3",
            params![severity.as_str(), ident.analyzer_name, ident.checker_name],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Repoint reports from one checker id to another (fake-checker backfill).
pub fn repoint_reports(
    conn: &Connection,
    report_ids: &[i64],
    checker_id: i64,
) -> Result<(), StorageError> {
    let mut stmt = conn
        .prepare_cached("UPDATE reports SET checker_id = ?1 WHERE id = ?2")
        .map_err(db_err)?;
    for report_id in report_ids {
        stmt.execute(params![checker_id, report_id]).map_err(db_err)?;
    }
    Ok(())
}

fn map_checker_row(row: &rusqlite::Row) -> rusqlite::Result<CheckerRow> {
    let severity_text: String = row.get(3)?;
    Ok(CheckerRow {
        id: row.get(0)?,
        analyzer_name: row.get(1)?,
        checker_name: row.get(2)?,
        severity: Severity::parse(&severity_text).unwrap_or_default(),
    })
}
