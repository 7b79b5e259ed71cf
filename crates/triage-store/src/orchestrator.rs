//! Mass store orchestration.
//!
//! A store is split in two. The foreground input handler validates what
//! can be validated cheaply, takes the run lock and persists the upload
//! into the task directory before a task token is handed out. The
//! background part does everything else: extraction, metadata parsing,
//! one big write transaction, and post-commit fixups, releasing the lock
//! on every path out. The transaction boundary is the all-or-nothing
//! guarantee: a failed store leaves the run exactly as it was.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use triage_core::errors::{StoreError, WrongComment};
use triage_core::traits::Cancellable;
use triage_core::types::{CheckerIdentity, ParsedReport};
use triage_storage::connection::with_immediate_transaction;
use triage_storage::queries::{run_history, runs};

use crate::archive::{
    self, ARCHIVE_FILE, REVIEW_STATUS_FILE, ROOT_DIR, SKIP_FILE, STORE_CONFIG_FILE,
};
use crate::checker_registry::{self, CheckerRegistry, PendingBackfill, Sleeper, ThreadSleeper};
use crate::context::ServerContext;
use crate::metadata::RunMetadata;
use crate::parser::{report_files_in, JsonReportParser, ReportParser};
use crate::reconcile::ReconcileEngine;
use crate::review_status::ReviewStatusResolver;
use crate::run_lock::{RunLockGuard, RunLockManager};
use crate::skipfile::SkipFilter;
use crate::source_store;

/// Client-supplied store parameters, persisted next to the archive as
/// `store_configuration.json` so an interrupted task is diagnosable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreParams {
    pub run_name: String,
    pub username: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Path prefixes to strip from client paths, longest match first.
    #[serde(default)]
    pub trim_path_prefixes: Vec<String>,
    /// Wipe the run's existing reports before storing.
    #[serde(default)]
    pub force: bool,
}

/// What a finished store did, recorded on the task row.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub run_id: i64,
    pub stored: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub closed: u64,
}

impl StoreSummary {
    pub fn comment(&self) -> String {
        format!(
            "stored {} report(s), {} skipped, {} duplicate(s) collapsed, {} closed",
            self.stored, self.skipped, self.duplicates, self.closed
        )
    }
}

/// Normalized paths plus the mapping back to the archive's layout.
struct Manifest {
    /// Normalized path -> content hash.
    hashes: FxHashMap<String, String>,
    /// Normalized path -> path under the archive's `root/` tree.
    archive_paths: FxHashMap<String, String>,
}

/// One mass store operation.
pub struct MassStoreRun {
    context: Arc<ServerContext>,
    params: StoreParams,
    sleeper: Arc<dyn Sleeper>,
}

impl MassStoreRun {
    pub fn new(context: Arc<ServerContext>, params: StoreParams) -> Self {
        Self {
            context,
            params,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn params(&self) -> &StoreParams {
        &self.params
    }

    /// Foreground half: take the run lock, then persist the upload and
    /// its parameters into the task directory. Runs on the API thread, so
    /// a second store of the same run fails fast instead of after a
    /// multi-gigabyte extraction, and an unreadable archive fails the
    /// call synchronously, before a token is handed out.
    pub fn prepare(&self, token: &str, archive_source: &Path) -> Result<RunLockGuard, StoreError> {
        if self.params.run_name.trim().is_empty() {
            return Err(StoreError::InvalidInput {
                message: "run name must not be empty".to_string(),
            });
        }

        let lock_manager = self.lock_manager();
        let guard = lock_manager.acquire(&self.params.run_name, &self.params.username)?;

        if let Err(e) = self.stage_upload(token, archive_source) {
            if let Err(release_err) = lock_manager.release(guard) {
                tracing::warn!(
                    run_name = %self.params.run_name,
                    error = %release_err,
                    "failed to release run lock after staging failure"
                );
            }
            return Err(e);
        }
        Ok(guard)
    }

    fn stage_upload(&self, token: &str, archive_source: &Path) -> Result<(), StoreError> {
        let task_dir = self.context.task_dir(token)?;
        std::fs::copy(archive_source, task_dir.join(ARCHIVE_FILE))
            .map_err(|e| StoreError::io("persist upload archive", &e))?;

        let config_json =
            serde_json::to_vec_pretty(&self.params).map_err(|e| StoreError::InvalidInput {
                message: format!("serialize store parameters: {e}"),
            })?;
        std::fs::write(task_dir.join(STORE_CONFIG_FILE), config_json)
            .map_err(|e| StoreError::io("write store configuration", &e))?;
        Ok(())
    }

    /// Background half: the actual store. Consumes the lock guard handed
    /// out by [`prepare`](Self::prepare); the lock comes off on every
    /// path out, so the store result is held until release has run.
    pub fn execute(
        &self,
        token: &str,
        guard: RunLockGuard,
        cancel: &dyn Cancellable,
    ) -> Result<StoreSummary, StoreError> {
        let started = std::time::Instant::now();

        let stored = self.run_locked(token, cancel);
        let released = self.lock_manager().release(guard);
        self.context.cleanup_task_dir(token);

        let summary = stored?;
        released?;
        tracing::info!(
            run_name = %self.params.run_name,
            run_id = summary.run_id,
            stored = summary.stored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mass store finished"
        );
        Ok(summary)
    }

    /// Drop this store's run-lock row without going through `execute`.
    /// Used when a prepared store never reaches its executor.
    pub fn abandon_lock(&self) {
        let result = self
            .context
            .db
            .with_writer(|conn| triage_storage::queries::run_locks::delete_lock(conn, &self.params.run_name));
        if let Err(e) = result {
            tracing::warn!(
                run_name = %self.params.run_name,
                error = %e,
                "failed to release abandoned run lock"
            );
        }
    }

    fn lock_manager(&self) -> RunLockManager {
        RunLockManager::new(Arc::clone(&self.context.db), &self.context.config)
    }

    fn run_locked(&self, token: &str, cancel: &dyn Cancellable) -> Result<StoreSummary, StoreError> {
        cancel.checkpoint()?;
        let task_dir = self.context.task_dir(token)?;
        let extracted = task_dir.join("extracted");
        archive::extract_archive(&task_dir.join(ARCHIVE_FILE), &extracted)?;
        cancel.checkpoint()?;

        let report_dirs = archive::report_dirs(&extracted)?;
        let metadata = self.load_metadata(&report_dirs)?;
        let manifest = self.load_manifest(&extracted)?;

        // Metadata-known checkers get their rows in a committed
        // transaction of their own, before the big one exists.
        let known_checkers: Vec<CheckerIdentity> = metadata
            .checker_to_analyzer
            .iter()
            .map(|(checker, analyzer)| CheckerIdentity::new(analyzer.clone(), checker.clone()))
            .collect();
        checker_registry::store_checker_identifiers(
            &self.context.db,
            Arc::clone(&self.sleeper),
            known_checkers,
        )?;
        cancel.checkpoint()?;

        let (summary, wrong_comments, pending) =
            self.store_under_lock(&extracted, &report_dirs, &metadata, &manifest, cancel)?;

        checker_registry::backfill_fake_checkers(
            &self.context.db,
            Arc::clone(&self.sleeper),
            pending,
        )?;
        self.context.db.checkpoint()?;

        if !wrong_comments.is_empty() {
            // The data is durable; the task still fails so the client
            // learns which comments were not applied.
            return Err(StoreError::WrongReviewStatusComments {
                comments: wrong_comments,
            });
        }
        Ok(summary)
    }

    fn store_under_lock(
        &self,
        extracted: &Path,
        report_dirs: &[PathBuf],
        metadata: &RunMetadata,
        manifest: &Manifest,
        cancel: &dyn Cancellable,
    ) -> Result<(StoreSummary, Vec<WrongComment>, Vec<PendingBackfill>), StoreError> {
        let now = self.context.now();
        let prefixes = &self.params.trim_path_prefixes;
        let parser = JsonReportParser;
        let source_root = extracted.join(ROOT_DIR);

        self.context.db.with_writer(|conn| {
            with_immediate_transaction(conn, |tx| {
                let run_id = self.ensure_run(tx, now)?;

                let history_id = run_history::insert_history(
                    tx,
                    run_id,
                    self.params.tag.as_deref(),
                    &self.params.username,
                    now,
                    metadata.version_string().as_deref(),
                    self.params.description.as_deref(),
                )?;
                for command in &metadata.check_commands {
                    run_history::insert_analysis_info(tx, history_id, command)?;
                }
                for (analyzer, stats) in &metadata.statistics {
                    let failed_files = to_json_list(&stats.failed_files);
                    let successful_files = to_json_list(&stats.successful_files);
                    run_history::insert_analyzer_statistics(
                        tx,
                        history_id,
                        analyzer,
                        stats.version.as_deref(),
                        stats.successful,
                        stats.failed,
                        failed_files.as_deref(),
                        successful_files.as_deref(),
                    )?;
                }

                let sources = source_store::store_source_files(
                    tx,
                    extracted,
                    &manifest.hashes,
                    &manifest.archive_paths,
                    cancel,
                )?;
                source_store::store_blame_info(tx, extracted, &manifest.archive_paths)?;

                let mut registry = CheckerRegistry::new(tx, Arc::clone(&self.sleeper))?;
                let mut engine = ReconcileEngine::new(
                    tx,
                    run_id,
                    &self.params.run_name,
                    &self.params.username,
                    now,
                    self.context.config.product.report_limit,
                    &sources.file_ids,
                    metadata,
                )?;

                for dir in report_dirs {
                    cancel.checkpoint()?;
                    let skip = SkipFilter::load(&dir.join(SKIP_FILE))?;
                    let rules_path = dir.join(REVIEW_STATUS_FILE);
                    let resolver = ReviewStatusResolver::new(
                        &source_root,
                        rules_path.is_file().then_some(rules_path.as_path()),
                    )?
                    .with_path_map(manifest.archive_paths.clone());

                    for file in report_files_in(dir, &parser)? {
                        let mut batch = parser.parse(&file)?;
                        for report in &mut batch {
                            normalize_report_paths(report, prefixes);
                        }
                        engine.store_reports(tx, &mut registry, &resolver, &skip, &batch, cancel)?;
                    }
                }

                let outcome = engine.finish(tx)?;
                runs::finish_run(tx, run_id, metadata.total_duration_secs(), now)?;

                let summary = StoreSummary {
                    run_id,
                    stored: outcome.stored,
                    skipped: outcome.skipped,
                    duplicates: outcome.duplicates,
                    closed: outcome.closed,
                };
                Ok((summary, outcome.wrong_comments, outcome.pending_backfill))
            })
        })
    }

    /// Find or create the run row. A forced store deletes the run
    /// outright (reports and histories cascade) and recreates it, so the
    /// new baseline starts from a fresh creation date.
    fn ensure_run(&self, conn: &Connection, now: i64) -> Result<i64, StoreError> {
        match runs::find_by_name(conn, &self.params.run_name)? {
            Some(run) => {
                if self.params.force {
                    if !runs::delete_run(conn, run.id)? {
                        return Err(StoreError::InvalidInput {
                            message: format!(
                                "run '{}' is delete-protected and cannot be force-stored",
                                self.params.run_name
                            ),
                        });
                    }
                    tracing::info!(
                        run_name = %self.params.run_name,
                        "force store recreated run"
                    );
                    return Ok(runs::insert_run(conn, &self.params.run_name, now)?);
                }
                Ok(run.id)
            }
            None => {
                if let Some(limit) = self.context.config.product.run_limit {
                    if runs::count_runs(conn)? >= limit {
                        return Err(StoreError::RunLimitExceeded { limit });
                    }
                }
                Ok(runs::insert_run(conn, &self.params.run_name, now)?)
            }
        }
    }

    fn load_metadata(&self, report_dirs: &[PathBuf]) -> Result<RunMetadata, StoreError> {
        let mut parts = Vec::with_capacity(report_dirs.len());
        for dir in report_dirs {
            let path = dir.join(archive::METADATA_FILE);
            if path.is_file() {
                parts.push(RunMetadata::parse_file(&path)?);
            }
        }
        Ok(RunMetadata::merge(parts))
    }

    fn load_manifest(&self, extracted: &Path) -> Result<Manifest, StoreError> {
        let raw = archive::read_content_hashes(extracted)?;
        let mut hashes = FxHashMap::default();
        let mut archive_paths = FxHashMap::default();
        for (archive_path, hash) in raw {
            let normalized = normalize_path(&archive_path, &self.params.trim_path_prefixes);
            archive_paths.insert(normalized.clone(), archive_path);
            hashes.insert(normalized, hash);
        }
        Ok(Manifest {
            hashes,
            archive_paths,
        })
    }
}

fn to_json_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        serde_json::to_string(items).ok()
    }
}

/// Apply client path normalization: trim requested prefixes, then the
/// leading slash, yielding the repository-relative form used everywhere
/// server-side.
pub fn normalize_path(path: &str, prefixes: &[String]) -> String {
    let owned;
    let absolute = if path.starts_with('/') {
        path
    } else {
        owned = format!("/{path}");
        &owned
    };
    archive::trim_path(archive::trim_path_prefixes(absolute, prefixes)).to_string()
}

/// Rewrite every path in a parsed report to its normalized form.
fn normalize_report_paths(report: &mut ParsedReport, prefixes: &[String]) {
    report.file_path = normalize_path(&report.file_path, prefixes);
    for pos in &mut report.bug_path_positions {
        pos.file_path = normalize_path(&pos.file_path, prefixes);
    }
    for event in &mut report.bug_path_events {
        event.file_path = normalize_path(&event.file_path, prefixes);
    }
    for data in &mut report.extended_data {
        data.file_path = normalize_path(&data.file_path, prefixes);
    }
}
