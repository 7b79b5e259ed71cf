//! Background task execution.
//!
//! The API thread does only fast, fallible preparation; the heavy part of
//! a store runs on a worker pool fed through a bounded channel. Task
//! state lives in the `tasks` table so clients can poll a token across
//! server restarts; tasks still enqueued at shutdown are marked dropped,
//! never silently lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use triage_core::config::ServerConfig;
use triage_core::errors::{StoreError, TaskError};
use triage_core::traits::{Cancellable, CancellationToken};
use triage_storage::queries::tasks::{self, TaskRow, TaskStatus};
use triage_storage::DatabaseManager;

use crate::context::unix_now;

/// The work a task performs. Returns an optional human-readable comment
/// recorded on the task row.
pub type TaskJob = Box<dyn FnOnce(&CancellationToken) -> Result<Option<String>, StoreError> + Send>;

struct QueuedTask {
    token: String,
    job: TaskJob,
}

/// Owns the worker pool and the task bookkeeping.
pub struct TaskManager {
    db: Arc<DatabaseManager>,
    sender: Option<Sender<QueuedTask>>,
    workers: Vec<std::thread::JoinHandle<()>>,
    cancels: Arc<Mutex<FxHashMap<String, CancellationToken>>>,
    shutting_down: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl TaskManager {
    pub fn new(db: Arc<DatabaseManager>, config: &ServerConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<QueuedTask>();
        let cancels: Arc<Mutex<FxHashMap<String, CancellationToken>>> =
            Arc::new(Mutex::new(FxHashMap::default()));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.store.worker_count);
        for worker_id in 0..config.store.worker_count {
            let receiver = receiver.clone();
            let db = Arc::clone(&db);
            let cancels = Arc::clone(&cancels);
            let shutting_down = Arc::clone(&shutting_down);
            let handle = std::thread::Builder::new()
                .name(format!("store-worker-{worker_id}"))
                .spawn(move || worker_loop(receiver, db, cancels, shutting_down))
                .unwrap_or_else(|e| panic!("spawn store worker: {e}"));
            workers.push(handle);
        }

        Self {
            db,
            sender: Some(sender),
            workers,
            cancels,
            shutting_down,
            drain_timeout: Duration::from_millis(config.store.drain_timeout_ms),
        }
    }

    /// Create the task row and its cancel handle without queueing any
    /// work yet. Callers stage task-scoped input (the upload archive)
    /// between `register` and [`submit`](Self::submit).
    pub fn register(
        &self,
        kind: &str,
        username: Option<&str>,
        summary: &str,
    ) -> Result<String, StoreError> {
        if self.sender.is_none() {
            return Err(TaskError::QueueClosed.into());
        }
        let now = unix_now();
        let token = generate_token(kind, now);
        self.db
            .with_writer(|conn| tasks::insert_task(conn, &token, kind, username, summary, now))
            .map_err(TaskError::Storage)?;
        if let Ok(mut map) = self.cancels.lock() {
            map.insert(token.clone(), CancellationToken::default());
        }
        tracing::info!(token, kind, "task registered");
        Ok(token)
    }

    /// Queue the work for a registered task.
    pub fn submit(&self, token: &str, job: TaskJob) -> Result<(), StoreError> {
        let sender = self.sender.as_ref().ok_or(TaskError::QueueClosed)?;
        sender
            .send(QueuedTask {
                token: token.to_string(),
                job,
            })
            .map_err(|_| TaskError::QueueClosed)?;
        tracing::debug!(token, "task enqueued");
        Ok(())
    }

    /// Register and queue in one step.
    pub fn enqueue(
        &self,
        kind: &str,
        username: Option<&str>,
        summary: &str,
        job: TaskJob,
    ) -> Result<String, StoreError> {
        let token = self.register(kind, username, summary)?;
        self.submit(&token, job)?;
        Ok(token)
    }

    /// Mark a registered-but-never-submitted task failed (foreground
    /// preparation fell over after the token was handed out).
    pub fn abort_registered(&self, token: &str, reason: &str) {
        let result = self.db.with_writer(|conn| {
            tasks::mark_finished(conn, token, TaskStatus::Failed, unix_now(), Some(reason))
        });
        if let Err(e) = result {
            tracing::error!(token, error = %e, "failed to abort registered task");
        }
        remove_cancel(&self.cancels, token);
    }

    /// Read the current state of a task.
    pub fn get_task(&self, token: &str) -> Result<TaskRow, StoreError> {
        let row = self
            .db
            .with_reader(|conn| tasks::get_task(conn, token))
            .map_err(TaskError::Storage)?;
        row.ok_or_else(|| {
            TaskError::NotFound {
                token: token.to_string(),
            }
            .into()
        })
    }

    /// Request cancellation. Returns true if the task was still live and
    /// the request was delivered; the task itself decides when to stop,
    /// at its next cancellation checkpoint.
    pub fn cancel(&self, token: &str) -> Result<bool, StoreError> {
        let row = self.get_task(token)?;
        if row.status.is_terminal() {
            return Ok(false);
        }
        let delivered = self
            .cancels
            .lock()
            .ok()
            .and_then(|map| map.get(token).map(CancellationToken::clone))
            .map(|t| {
                t.cancel();
                true
            })
            .unwrap_or(false);
        if delivered {
            tracing::info!(token, "task cancellation requested");
        }
        Ok(delivered)
    }

    /// Drain and stop the pool. Queued tasks that never started are
    /// marked dropped; running tasks get a cancellation request once the
    /// drain timeout passes, then the call blocks until they return.
    pub fn shutdown(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        // Closing the channel lets idle workers exit; queued tasks are
        // still delivered, and workers mark them dropped under the flag.
        self.sender = None;

        let deadline = Instant::now() + self.drain_timeout;
        while Instant::now() < deadline {
            if self.workers.iter().all(|w| w.is_finished()) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        if let Ok(map) = self.cancels.lock() {
            for token in map.values() {
                token.cancel();
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("store worker panicked during shutdown");
            }
        }

        // Safety net for rows that never reached a worker.
        let dropped = self
            .db
            .with_writer(|conn| tasks::drop_enqueued(conn, unix_now()));
        match dropped {
            Ok(tokens) if !tokens.is_empty() => {
                tracing::warn!(count = tokens.len(), "dropped tasks at shutdown");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to drop enqueued tasks"),
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if !self.shutting_down.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

fn worker_loop(
    receiver: Receiver<QueuedTask>,
    db: Arc<DatabaseManager>,
    cancels: Arc<Mutex<FxHashMap<String, CancellationToken>>>,
    shutting_down: Arc<AtomicBool>,
) {
    for task in receiver.iter() {
        let token = task.token;

        if shutting_down.load(Ordering::SeqCst) {
            finish(&db, &token, TaskStatus::Dropped, None);
            remove_cancel(&cancels, &token);
            continue;
        }

        let cancel = cancels
            .lock()
            .ok()
            .and_then(|map| map.get(&token).map(CancellationToken::clone))
            .unwrap_or_default();

        if let Err(e) = db.with_writer(|conn| tasks::mark_started(conn, &token, unix_now())) {
            tracing::error!(token, error = %e, "failed to mark task started");
        }
        tracing::info!(token, "task started");

        let result = (task.job)(&cancel);
        let (status, comments) = match result {
            Ok(comment) => (TaskStatus::Completed, comment),
            Err(StoreError::Cancelled) => (TaskStatus::Cancelled, None),
            Err(e) => (TaskStatus::Failed, Some(e.to_string())),
        };
        tracing::info!(token, status = status.as_str(), "task finished");

        finish(&db, &token, status, comments.as_deref());
        remove_cancel(&cancels, &token);
    }
}

fn finish(db: &DatabaseManager, token: &str, status: TaskStatus, comments: Option<&str>) {
    let result =
        db.with_writer(|conn| tasks::mark_finished(conn, token, status, unix_now(), comments));
    if let Err(e) = result {
        tracing::error!(token, error = %e, "failed to record task completion");
    }
}

fn remove_cancel(cancels: &Mutex<FxHashMap<String, CancellationToken>>, token: &str) {
    if let Ok(mut map) = cancels.lock() {
        map.remove(token);
    }
}

/// Opaque task token: 32 hex characters, unique per process lifetime.
fn generate_token(kind: &str, now: i64) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut material = Vec::with_capacity(kind.len() + 24);
    material.extend_from_slice(kind.as_bytes());
    material.extend_from_slice(&now.to_le_bytes());
    material.extend_from_slice(&seq.to_le_bytes());
    material.extend_from_slice(&std::process::id().to_le_bytes());
    format!("{:032x}", xxh3_128(&material))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(workers: usize) -> TaskManager {
        let db = Arc::new(DatabaseManager::open_in_memory().unwrap());
        let mut config = ServerConfig::default();
        config.store.worker_count = workers;
        config.store.drain_timeout_ms = 500;
        TaskManager::new(db, &config)
    }

    fn wait_terminal(mgr: &TaskManager, token: &str) -> TaskRow {
        for _ in 0..100 {
            let row = mgr.get_task(token).unwrap();
            if row.status.is_terminal() {
                return row;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("task {token} never finished");
    }

    #[test]
    fn tokens_are_unique() {
        let now = unix_now();
        let a = generate_token("mass_store", now);
        let b = generate_token("mass_store", now);
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn completed_task_records_comment() {
        let mgr = manager(1);
        let token = mgr
            .enqueue(
                "mass_store",
                Some("alice"),
                "store run-a",
                Box::new(|_| Ok(Some("stored 3 reports".to_string()))),
            )
            .unwrap();
        let row = wait_terminal(&mgr, &token);
        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.comments.as_deref(), Some("stored 3 reports"));
        assert!(row.started_at.is_some());
        assert!(row.finished_at.is_some());
    }

    #[test]
    fn failed_task_records_error() {
        let mgr = manager(1);
        let token = mgr
            .enqueue(
                "mass_store",
                None,
                "store run-b",
                Box::new(|_| {
                    Err(StoreError::InvalidInput {
                        message: "bad archive".to_string(),
                    })
                }),
            )
            .unwrap();
        let row = wait_terminal(&mgr, &token);
        assert_eq!(row.status, TaskStatus::Failed);
        assert!(row.comments.unwrap().contains("bad archive"));
    }

    #[test]
    fn cancellation_reaches_a_running_task() {
        let mgr = manager(1);
        let token = mgr
            .enqueue(
                "mass_store",
                None,
                "store run-c",
                Box::new(|cancel| {
                    for _ in 0..200 {
                        cancel.checkpoint()?;
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Ok(None)
                }),
            )
            .unwrap();
        // Give the worker a moment to pick it up, then cancel.
        std::thread::sleep(Duration::from_millis(50));
        assert!(mgr.cancel(&token).unwrap());
        let row = wait_terminal(&mgr, &token);
        assert_eq!(row.status, TaskStatus::Cancelled);
    }

    #[test]
    fn unknown_token_is_an_error() {
        let mgr = manager(1);
        let err = mgr.get_task("no-such-token").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Task(TaskError::NotFound { .. })
        ));
    }
}
