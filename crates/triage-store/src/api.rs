//! The report service: the RPC-facing surface of the store pipeline.
//!
//! Every method is a thin translation layer — validate, dispatch to
//! storage or the task manager, map errors. Anything slow runs as a
//! background task; the only heavy synchronous work is persisting the
//! uploaded archive to disk.

use std::path::Path;
use std::sync::Arc;

use triage_core::errors::{StorageError, StoreError};
use triage_core::types::{DetectionStatus, ReviewStatus, StoredReportData};
use triage_storage::queries::tasks::TaskRow;
use triage_storage::gc;
use triage_storage::queries::{files, reports, run_history, runs};

use crate::context::ServerContext;
use crate::orchestrator::{MassStoreRun, StoreParams};
use crate::tasks::TaskManager;

pub const MASS_STORE_TASK_KIND: &str = "mass_store";

/// The store-facing service API.
pub struct ReportService {
    context: Arc<ServerContext>,
    tasks: TaskManager,
}

impl ReportService {
    pub fn new(context: Arc<ServerContext>) -> Self {
        let tasks = TaskManager::new(Arc::clone(&context.db), &context.config);
        Self { context, tasks }
    }

    /// Accept an upload for asynchronous storing. Returns the task token
    /// the client polls via [`get_task_info`](Self::get_task_info).
    ///
    /// Foreground work is deliberately small: a cheap run-limit
    /// pre-check, taking the run lock, persisting the archive, recording
    /// the task. Locking up front means a concurrent store of the same
    /// run is refused before any expensive work. The authoritative limit
    /// check re-runs inside the store transaction.
    pub fn mass_store_run_asynchronous(
        &self,
        archive_path: &Path,
        params: StoreParams,
    ) -> Result<String, StoreError> {
        self.precheck_run_limit(&params.run_name)?;

        let username = params.username.clone();
        let summary = format!("mass store of run '{}'", params.run_name);
        let store = Arc::new(MassStoreRun::new(Arc::clone(&self.context), params));

        let token = self
            .tasks
            .register(MASS_STORE_TASK_KIND, Some(&username), &summary)?;

        let guard = match store.prepare(&token, archive_path) {
            Ok(guard) => guard,
            Err(e) => {
                self.tasks.abort_registered(&token, &e.to_string());
                self.context.cleanup_task_dir(&token);
                return Err(e);
            }
        };

        let job_token = token.clone();
        let job_store = Arc::clone(&store);
        let submitted = self.tasks.submit(
            &token,
            Box::new(move |cancel| {
                job_store
                    .execute(&job_token, guard, cancel)
                    .map(|summary| Some(summary.comment()))
            }),
        );
        if let Err(e) = submitted {
            // The guard went down with the rejected job; drop the lock
            // row by name so the run is not blocked until grace expiry.
            store.abandon_lock();
            self.tasks.abort_registered(&token, &e.to_string());
            self.context.cleanup_task_dir(&token);
            return Err(e);
        }
        Ok(token)
    }

    /// Which of the given content hashes the server does not hold yet.
    /// Clients call this before packing an upload so unchanged sources
    /// are never re-sent.
    pub fn get_missing_content_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let missing = self
            .context
            .db
            .with_reader(|conn| files::missing_content_hashes(conn, hashes))?;
        Ok(missing)
    }

    /// Blame info stored for a file, decompressed. `None` when the file
    /// is unknown or its content never received blame data.
    pub fn get_blame_info(&self, file_id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let blame = self.context.db.with_reader(|conn| {
            let Some(file) = files::find_file_by_id(conn, file_id)? else {
                return Ok::<_, StorageError>(None);
            };
            files::get_blame_info(conn, &file.content_hash)
        })?;
        Ok(blame)
    }

    /// Set the review status of a single report.
    ///
    /// `fixed_at` follows the review status: a closing status (false
    /// positive, intentional) stamps it; reverting to a non-closing
    /// status clears it again, unless the finding is detection-closed in
    /// its own right.
    pub fn change_review_status(
        &self,
        report_id: i64,
        status: ReviewStatus,
        message: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        let now = self.context.now();
        self.context.db.with_writer(|conn| {
            let report = reports::find_by_id(conn, report_id)?.ok_or_else(|| {
                StorageError::NotFound {
                    what: format!("report {report_id}"),
                }
            })?;

            let fixed_at = if status.is_closing() {
                Some(report.fixed_at.unwrap_or(now))
            } else if report.detection_status.is_closed() {
                report.fixed_at
            } else {
                None
            };

            reports::update_review_status(
                conn,
                report_id,
                status,
                Some(author),
                Some(message),
                Some(now),
                false,
                fixed_at,
            )?;
            Ok::<_, StoreError>(())
        })?;
        tracing::info!(report_id, status = status.as_str(), author, "review status changed");
        Ok(())
    }

    /// Delete a run and everything hanging off it, then collect the
    /// orphans. Returns false if the run is unknown or delete-protected.
    pub fn remove_run(&self, run_name: &str) -> Result<bool, StoreError> {
        let grace = self.context.config.store.lock_grace_seconds;
        let now = self.context.now();
        let removed = self.context.db.with_writer(|conn| {
            let Some(run) = runs::find_by_name(conn, run_name)? else {
                return Ok::<_, StorageError>(false);
            };
            let deleted = runs::delete_run(conn, run.id)?;
            if deleted {
                let report = gc::collect_garbage(conn, now - grace)?;
                tracing::info!(
                    run_name,
                    run_id = run.id,
                    cleaned = report.total_deleted,
                    "run removed, orphans collected"
                );
            }
            Ok(deleted)
        })?;
        Ok(removed)
    }

    /// Delete reports of the given runs matching the filter. Returns the
    /// number of deleted reports.
    pub fn remove_run_reports(
        &self,
        run_ids: &[i64],
        filter: &reports::ReportFilter,
    ) -> Result<u64, StoreError> {
        let deleted = self
            .context
            .db
            .with_writer(|conn| reports::delete_matching(conn, run_ids, filter))?;
        tracing::info!(deleted, "reports removed");
        Ok(deleted)
    }

    /// Poll a background task by token.
    pub fn get_task_info(&self, token: &str) -> Result<TaskRow, StoreError> {
        self.tasks.get_task(token)
    }

    /// Request cancellation of a background task. Returns whether the
    /// request was delivered to a still-live task.
    pub fn cancel_task(&self, token: &str) -> Result<bool, StoreError> {
        self.tasks.cancel(token)
    }

    /// Runs whose name contains the filter string (all runs when empty).
    pub fn get_run_data(&self, name_filter: &str) -> Result<Vec<runs::RunRow>, StoreError> {
        let rows = self
            .context
            .db
            .with_reader(|conn| runs::query_runs(conn, name_filter))?;
        Ok(rows)
    }

    /// Store history of a run, newest first.
    pub fn get_run_history(
        &self,
        run_id: i64,
    ) -> Result<Vec<run_history::RunHistoryRow>, StoreError> {
        let rows = self
            .context
            .db
            .with_reader(|conn| run_history::query_by_run(conn, run_id))?;
        Ok(rows)
    }

    /// Detection status histogram of a run.
    pub fn get_detection_status_counts(
        &self,
        run_id: i64,
    ) -> Result<Vec<(DetectionStatus, u64)>, StoreError> {
        let counts = self
            .context
            .db
            .with_reader(|conn| reports::detection_status_counts(conn, run_id))?;
        Ok(counts)
    }

    /// All reports currently attached to a run.
    pub fn get_run_results(&self, run_id: i64) -> Result<Vec<StoredReportData>, StoreError> {
        let rows = self
            .context
            .db
            .with_reader(|conn| reports::query_by_run(conn, run_id))?;
        Ok(rows)
    }

    /// Drain the task queue and stop the workers.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
    }

    fn precheck_run_limit(&self, run_name: &str) -> Result<(), StoreError> {
        let Some(limit) = self.context.config.product.run_limit else {
            return Ok(());
        };
        let (exists, count) = self.context.db.with_reader(|conn| {
            let exists = runs::find_by_name(conn, run_name)?.is_some();
            let count = runs::count_runs(conn)?;
            Ok::<_, StorageError>((exists, count))
        })?;
        if !exists && count >= limit {
            return Err(StoreError::RunLimitExceeded { limit });
        }
        Ok(())
    }
}
