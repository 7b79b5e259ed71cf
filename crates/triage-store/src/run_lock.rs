//! Database-resident run locks.
//!
//! One store per run name at a time, enforced across processes through a
//! `run_locks` row. A lock older than the grace period counts as
//! abandoned (the holder crashed mid-store) and may be taken over.

use std::sync::Arc;

use triage_core::config::ServerConfig;
use triage_core::errors::{StorageError, StoreError};
use triage_storage::queries::run_locks;
use triage_storage::DatabaseManager;

use crate::context::unix_now;

/// Acquires and releases per-run store locks.
pub struct RunLockManager {
    db: Arc<DatabaseManager>,
    grace_seconds: i64,
}

/// A held lock. Dropping it does NOT release; release is explicit so the
/// caller controls when (and on which connection) the row disappears.
#[derive(Debug)]
pub struct RunLockGuard {
    pub run_name: String,
    pub locked_at: i64,
}

impl RunLockManager {
    pub fn new(db: Arc<DatabaseManager>, config: &ServerConfig) -> Self {
        Self {
            db,
            grace_seconds: config.store.lock_grace_seconds,
        }
    }

    /// Try to take the lock for `run_name` on behalf of `username`.
    ///
    /// A plain insert wins the common case. On conflict the existing row
    /// is inspected: within the grace period the store is refused with
    /// [`StoreError::RunLocked`]; past it the row is taken over with a
    /// guarded update, so two takeover attempts cannot both succeed.
    pub fn acquire(&self, run_name: &str, username: &str) -> Result<RunLockGuard, StoreError> {
        let now = unix_now();
        let insert = self
            .db
            .with_writer(|conn| run_locks::insert_lock(conn, run_name, now, username));

        match insert {
            Ok(()) => {
                tracing::debug!(run_name, username, "run lock acquired");
                return Ok(RunLockGuard {
                    run_name: run_name.to_string(),
                    locked_at: now,
                });
            }
            Err(e) if e.is_constraint_violation() => {}
            Err(e) => return Err(e.into()),
        }

        let expired_before = now - self.grace_seconds;
        let existing = self
            .db
            .with_writer(|conn| run_locks::get_lock(conn, run_name))?;
        let Some(existing) = existing else {
            // The holder released between our insert and this read.
            return self.acquire_once_more(run_name, username, now);
        };

        if existing.locked_at >= expired_before {
            return Err(StoreError::RunLocked {
                run_name: run_name.to_string(),
                locked_by: existing.username.unwrap_or_else(|| "unknown".to_string()),
                expires_at: existing.locked_at + self.grace_seconds,
            });
        }

        let taken = self.db.with_writer(|conn| {
            run_locks::touch_expired_lock(conn, run_name, now, username, expired_before)
        })?;
        if taken {
            tracing::info!(
                run_name,
                username,
                abandoned_by = existing.username.as_deref().unwrap_or("unknown"),
                "took over abandoned run lock"
            );
            Ok(RunLockGuard {
                run_name: run_name.to_string(),
                locked_at: now,
            })
        } else {
            // Someone else refreshed or took the lock first.
            Err(StoreError::RunLocked {
                run_name: run_name.to_string(),
                locked_by: "unknown".to_string(),
                expires_at: now + self.grace_seconds,
            })
        }
    }

    fn acquire_once_more(
        &self,
        run_name: &str,
        username: &str,
        now: i64,
    ) -> Result<RunLockGuard, StoreError> {
        let retry: Result<(), StorageError> = self
            .db
            .with_writer(|conn| run_locks::insert_lock(conn, run_name, now, username));
        match retry {
            Ok(()) => Ok(RunLockGuard {
                run_name: run_name.to_string(),
                locked_at: now,
            }),
            Err(e) if e.is_constraint_violation() => Err(StoreError::RunLocked {
                run_name: run_name.to_string(),
                locked_by: "unknown".to_string(),
                expires_at: now + self.grace_seconds,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Release a held lock. Must run regardless of store outcome.
    pub fn release(&self, guard: RunLockGuard) -> Result<(), StoreError> {
        self.db
            .with_writer(|conn| run_locks::delete_lock(conn, &guard.run_name))?;
        tracing::debug!(run_name = %guard.run_name, "run lock released");
        Ok(())
    }

    /// Drop every lock past the grace period. Called by retention.
    pub fn sweep_expired(&self) -> Result<u64, StoreError> {
        let cutoff = unix_now() - self.grace_seconds;
        let removed = self
            .db
            .with_writer(|conn| run_locks::delete_expired_locks(conn, cutoff))?;
        if removed > 0 {
            tracing::info!(removed, "swept expired run locks");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::config::ServerConfig;
    use triage_storage::migrations;

    fn manager(grace: i64) -> RunLockManager {
        let db = Arc::new(DatabaseManager::open_in_memory().unwrap());
        db.with_writer(|conn| migrations::run_migrations(conn)).unwrap();
        let mut config = ServerConfig::default();
        config.store.lock_grace_seconds = grace;
        RunLockManager::new(db, &config)
    }

    #[test]
    fn second_acquire_is_refused() {
        let mgr = manager(1800);
        let guard = mgr.acquire("run-a", "alice").unwrap();
        let err = mgr.acquire("run-a", "bob").unwrap_err();
        match err {
            StoreError::RunLocked { run_name, locked_by, .. } => {
                assert_eq!(run_name, "run-a");
                assert_eq!(locked_by, "alice");
            }
            other => panic!("expected RunLocked, got {other:?}"),
        }
        mgr.release(guard).unwrap();
        mgr.acquire("run-a", "bob").unwrap();
    }

    #[test]
    fn expired_lock_is_taken_over() {
        let mgr = manager(0);
        let _stale = mgr.acquire("run-a", "alice").unwrap();
        // grace 0 means any existing lock is immediately abandoned
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let guard = mgr.acquire("run-a", "bob").unwrap();
        assert_eq!(guard.run_name, "run-a");
    }

    #[test]
    fn locks_on_different_runs_are_independent() {
        let mgr = manager(1800);
        let a = mgr.acquire("run-a", "alice").unwrap();
        let b = mgr.acquire("run-b", "alice").unwrap();
        mgr.release(a).unwrap();
        mgr.release(b).unwrap();
    }
}
