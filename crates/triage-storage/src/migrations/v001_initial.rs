//! V001: Initial schema.
//! Runs, run histories, files/contents, checkers, reports and report
//! children, run locks.

pub const MIGRATION_SQL: &str = r#"
-- One row per distinct run name. Duration stays -1 while a store is in
-- flight; can_delete guards runs referenced by external bookkeeping.
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    date INTEGER NOT NULL,
    duration INTEGER NOT NULL DEFAULT -1,
    can_delete INTEGER NOT NULL DEFAULT 1
) STRICT;

-- Append-only ledger: one row per store operation against a run.
CREATE TABLE IF NOT EXISTS run_histories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    version_tag TEXT,
    user_name TEXT NOT NULL,
    time INTEGER NOT NULL,
    analyzer_version TEXT,
    description TEXT
) STRICT;

CREATE INDEX IF NOT EXISTS idx_run_histories_run ON run_histories(run_id);

-- Analyzer invocation commands recorded per store.
CREATE TABLE IF NOT EXISTS analysis_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_history_id INTEGER NOT NULL REFERENCES run_histories(id) ON DELETE CASCADE,
    analyzer_command TEXT NOT NULL
) STRICT;

-- Per-analyzer success/failure statistics per store. File lists are JSON
-- arrays of repository-relative paths.
CREATE TABLE IF NOT EXISTS analyzer_statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_history_id INTEGER NOT NULL REFERENCES run_histories(id) ON DELETE CASCADE,
    analyzer_type TEXT NOT NULL,
    version TEXT,
    successful INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    failed_files TEXT,
    successful_files TEXT
) STRICT;

-- Content-addressed file bytes, shared across identical files.
-- content and blame_info are zstd-compressed.
CREATE TABLE IF NOT EXISTS file_contents (
    content_hash TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    blame_info BLOB
) STRICT;

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filepath TEXT NOT NULL,
    content_hash TEXT NOT NULL REFERENCES file_contents(content_hash),
    remote_url TEXT,
    tracking_branch TEXT,
    UNIQUE(filepath, content_hash)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_files_path ON files(filepath);

-- Stable checker identities; append-only outside severity upgrades.
CREATE TABLE IF NOT EXISTS checkers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    analyzer_name TEXT NOT NULL,
    checker_name TEXT NOT NULL,
    severity TEXT NOT NULL DEFAULT 'unspecified',
    UNIQUE(analyzer_name, checker_name)
) STRICT;

-- One row per (run, bug hash, file) finding as currently known.
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    file_id INTEGER NOT NULL REFERENCES files(id),
    bug_id TEXT NOT NULL,
    checker_id INTEGER NOT NULL REFERENCES checkers(id),
    line INTEGER NOT NULL,
    col INTEGER NOT NULL,
    message TEXT NOT NULL,
    path_length INTEGER NOT NULL DEFAULT 0,
    detection_status TEXT NOT NULL DEFAULT 'new',
    review_status TEXT NOT NULL DEFAULT 'unreviewed',
    review_status_author TEXT,
    review_status_message TEXT,
    review_status_date INTEGER,
    review_status_is_in_source INTEGER NOT NULL DEFAULT 0,
    detected_at INTEGER NOT NULL,
    fixed_at INTEGER
) STRICT;

CREATE INDEX IF NOT EXISTS idx_reports_run ON reports(run_id);
CREATE INDEX IF NOT EXISTS idx_reports_run_bug ON reports(run_id, bug_id);
CREATE INDEX IF NOT EXISTS idx_reports_file ON reports(file_id);

-- Report children: deleted and rewritten wholesale on each store that
-- touches the report id.
CREATE TABLE IF NOT EXISTS bug_path_positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    idx INTEGER NOT NULL,
    file_id INTEGER NOT NULL REFERENCES files(id),
    start_line INTEGER NOT NULL,
    start_col INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_col INTEGER NOT NULL
) STRICT;

CREATE INDEX IF NOT EXISTS idx_bug_path_positions_report
    ON bug_path_positions(report_id);

CREATE TABLE IF NOT EXISTS bug_path_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    idx INTEGER NOT NULL,
    file_id INTEGER NOT NULL REFERENCES files(id),
    line INTEGER NOT NULL,
    col INTEGER NOT NULL,
    message TEXT NOT NULL
) STRICT;

CREATE INDEX IF NOT EXISTS idx_bug_path_events_report
    ON bug_path_events(report_id);
CREATE INDEX IF NOT EXISTS idx_bug_path_events_file
    ON bug_path_events(file_id);

CREATE TABLE IF NOT EXISTS extended_report_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    file_id INTEGER NOT NULL REFERENCES files(id),
    line INTEGER NOT NULL,
    col INTEGER NOT NULL,
    message TEXT NOT NULL
) STRICT;

CREATE INDEX IF NOT EXISTS idx_extended_report_data_report
    ON extended_report_data(report_id);

CREATE TABLE IF NOT EXISTS report_annotations (
    report_id INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(report_id, key)
) STRICT;

-- Cross-process mutual exclusion for stores, one row per run name.
CREATE TABLE IF NOT EXISTS run_locks (
    name TEXT PRIMARY KEY,
    locked_at INTEGER NOT NULL,
    username TEXT
) STRICT;
"#;
