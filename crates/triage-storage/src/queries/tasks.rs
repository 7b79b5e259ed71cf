//! Queries for the tasks table — background task bookkeeping.

use rusqlite::{params, Connection, OptionalExtension};
use triage_core::errors::StorageError;

use super::db_err;

/// Lifecycle status of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Enqueued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Still enqueued when the process shut down; never ran.
    Dropped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enqueued" => Some(Self::Enqueued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    /// True once the task can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Dropped)
    }
}

/// A task row.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub token: String,
    pub kind: String,
    pub status: TaskStatus,
    pub username: Option<String>,
    pub summary: String,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub comments: Option<String>,
}

/// Insert a freshly enqueued task.
pub fn insert_task(
    conn: &Connection,
    token: &str,
    kind: &str,
    username: Option<&str>,
    summary: &str,
    created_at: i64,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO tasks (token, kind, status, username, summary, created_at)
         VALUES (?1, ?2, 'enqueued', ?3, ?4, ?5)",
        params![token, kind, username, summary, created_at],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Mark a task running.
pub fn mark_started(conn: &Connection, token: &str, started_at: i64) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE tasks SET status = 'running', started_at = ?1 WHERE token = ?2",
        params![started_at, token],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Move a task into a terminal status with an optional comment trail.
pub fn mark_finished(
    conn: &Connection,
    token: &str,
    status: TaskStatus,
    finished_at: i64,
    comments: Option<&str>,
) -> Result<(), StorageError> {
    debug_assert!(status.is_terminal());
    conn.execute(
        "UPDATE tasks SET status = ?1, finished_at = ?2, comments = ?3 WHERE token = ?4",
        params![status.as_str(), finished_at, comments, token],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Mark every still-enqueued task dropped (process shutdown). Returns the
/// affected tokens.
pub fn drop_enqueued(conn: &Connection, finished_at: i64) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT token FROM tasks WHERE status = 'enqueued'")
        .map_err(db_err)?;
    let tokens: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(db_err)?
        .collect::<Result<_, _>>()
        .map_err(db_err)?;
    conn.execute(
        "UPDATE tasks SET status = 'dropped', finished_at = ?1 WHERE status = 'enqueued'",
        params![finished_at],
    )
    .map_err(db_err)?;
    Ok(tokens)
}

/// Read a task row by token.
pub fn get_task(conn: &Connection, token: &str) -> Result<Option<TaskRow>, StorageError> {
    conn.prepare_cached(
        "SELECT token, kind, status, username, summary, created_at, started_at,
                finished_at, comments
         FROM tasks WHERE token = ?1",
    )
    .map_err(db_err)?
    .query_row(params![token], |row| {
        let status_text: String = row.get(2)?;
        Ok(TaskRow {
            token: row.get(0)?,
            kind: row.get(1)?,
            status: TaskStatus::parse(&status_text).unwrap_or(TaskStatus::Failed),
            username: row.get(3)?,
            summary: row.get(4)?,
            created_at: row.get(5)?,
            started_at: row.get(6)?,
            finished_at: row.get(7)?,
            comments: row.get(8)?,
        })
    })
    .optional()
    .map_err(db_err)
}
