//! Versioned schema migrations.
//!
//! Each migration is an idempotent SQL batch; `PRAGMA user_version` tracks
//! the applied version. Migrations only ever append.

pub mod v001_initial;
pub mod v002_tasks;

use rusqlite::Connection;
use triage_core::errors::StorageError;

/// Ordered list of (version, SQL) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, v001_initial::MIGRATION_SQL),
    (2, v002_tasks::MIGRATION_SQL),
];

/// Apply all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StorageError::MigrationError {
            message: format!("read user_version: {e}"),
        })?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tracing::debug!(version, "applying migration");
        conn.execute_batch(sql)
            .map_err(|e| StorageError::MigrationError {
                message: format!("migration v{version}: {e}"),
            })?;
        conn.pragma_update(None, "user_version", version)
            .map_err(|e| StorageError::MigrationError {
                message: format!("set user_version {version}: {e}"),
            })?;
    }
    Ok(())
}

/// The schema version the code expects.
pub fn expected_version() -> i64 {
    MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0)
}
