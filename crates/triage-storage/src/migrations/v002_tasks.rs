//! V002: Background task bookkeeping.

pub const MIGRATION_SQL: &str = r#"
-- One row per background task (mass store, maintenance).
-- Status lifecycle: enqueued -> running -> completed | failed | cancelled,
-- or enqueued -> dropped at shutdown.
CREATE TABLE IF NOT EXISTS tasks (
    token TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'enqueued',
    username TEXT,
    summary TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    finished_at INTEGER,
    comments TEXT
) STRICT;

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at DESC);
"#;
