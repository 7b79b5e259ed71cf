//! Server context: explicit, constructed once, threaded through every
//! component constructor. No ambient globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use triage_core::config::ServerConfig;
use triage_core::errors::StoreError;
use triage_storage::DatabaseManager;

/// Everything a store pipeline component needs from its environment.
pub struct ServerContext {
    pub db: Arc<DatabaseManager>,
    pub config: ServerConfig,
    /// Root for task-scoped scratch directories.
    data_dir: PathBuf,
}

impl ServerContext {
    pub fn new(
        db: Arc<DatabaseManager>,
        config: ServerConfig,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let data_dir = config
            .data_dir
            .clone()
            .unwrap_or_else(|| data_dir.into());
        Self {
            db,
            config,
            data_dir,
        }
    }

    /// Current unix time in seconds.
    pub fn now(&self) -> i64 {
        unix_now()
    }

    /// Create (if needed) and return the scratch directory for a task.
    pub fn task_dir(&self, token: &str) -> Result<PathBuf, StoreError> {
        let dir = self.data_dir.join("tasks").join(token);
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io("create task dir", &e))?;
        Ok(dir)
    }

    /// Remove a task's scratch directory, best-effort.
    pub fn cleanup_task_dir(&self, token: &str) {
        let dir = self.data_dir.join("tasks").join(token);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to clean task dir");
            }
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Unix seconds. Free function so components without a context (tests,
/// the lock manager) share the same clock.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
