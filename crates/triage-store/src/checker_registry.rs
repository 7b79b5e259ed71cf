//! Checker identity registry.
//!
//! Reports reference checkers through a stable `checkers` row id. The
//! metadata-known checker set is registered up front in its own committed
//! transaction, before the main report transaction exists; during the
//! store, the registry resolves `(analyzer, checker)` pairs to ids with a
//! small in-memory cache, retrying resolution a few times before falling
//! back to the fake sentinel. Reports stored under the sentinel are
//! repointed to their real checker after the main transaction commits; an
//! identity that still cannot be registered after the retry budget fails
//! the store.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use rustc_hash::FxHashMap;

use triage_core::errors::{StoreError, StorageError};
use triage_core::types::{CheckerIdentity, Severity};
use triage_storage::queries::checkers;
use triage_storage::DatabaseManager;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(30);

/// Sleeping seam so tests can run the retry loop without wall-clock waits.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Default sleeper: blocks the store worker thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A report stored under the fake sentinel, awaiting repointing.
#[derive(Debug, Clone)]
pub struct PendingBackfill {
    pub report_id: i64,
    pub identity: CheckerIdentity,
}

/// Resolves checker identities to row ids for one store operation.
pub struct CheckerRegistry {
    cache: FxHashMap<CheckerIdentity, i64>,
    sleeper: Arc<dyn Sleeper>,
    fake_id: i64,
}

impl CheckerRegistry {
    /// Build a registry on the given connection, ensuring both sentinel
    /// rows exist and pre-caching them.
    pub fn new(conn: &Connection, sleeper: Arc<dyn Sleeper>) -> Result<Self, StorageError> {
        let fake_id = ensure_checker(conn, &CheckerIdentity::fake(), Severity::Unspecified)?;
        let unknown_id =
            ensure_checker(conn, &CheckerIdentity::unknown(), Severity::Unspecified)?;

        let mut cache = FxHashMap::default();
        cache.insert(CheckerIdentity::fake(), fake_id);
        cache.insert(CheckerIdentity::unknown(), unknown_id);

        Ok(Self {
            cache,
            sleeper,
            fake_id,
        })
    }

    /// The fake sentinel's row id.
    pub fn fake_id(&self) -> i64 {
        self.fake_id
    }

    /// Resolve an identity to its row id, retrying transient failures.
    ///
    /// Returns `None` when resolution keeps failing; the caller stores
    /// the report under the fake sentinel and queues it for backfill.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        identity: &CheckerIdentity,
        severity: Severity,
    ) -> Option<i64> {
        if let Some(id) = self.cache.get(identity) {
            return Some(*id);
        }

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match ensure_checker(conn, identity, severity) {
                Ok(id) => {
                    self.cache.insert(identity.clone(), id);
                    return Some(id);
                }
                Err(e) => {
                    tracing::warn!(
                        checker = %identity,
                        attempt,
                        error = %e,
                        "checker resolution failed"
                    );
                    if attempt < MAX_ATTEMPTS {
                        self.sleeper.sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
        None
    }
}

/// Insert-or-find a checker row, returning its id.
fn ensure_checker(
    conn: &Connection,
    identity: &CheckerIdentity,
    severity: Severity,
) -> Result<i64, StorageError> {
    checkers::insert_checker(conn, identity, severity)?;
    checkers::find_checker(conn, identity)?
        .map(|row| row.id)
        .ok_or_else(|| StorageError::sqlite(format!("checker row vanished for {identity}")))
}

/// Register this store's metadata-known checker set in its own committed
/// transaction, before the main report transaction exists, so concurrent
/// stores see the rows without holding the big write lock. Persistent
/// failure after the retry budget is fatal to the store.
pub fn store_checker_identifiers(
    db: &DatabaseManager,
    sleeper: Arc<dyn Sleeper>,
    identities: Vec<CheckerIdentity>,
) -> Result<(), StoreError> {
    db.with_writer(|conn| {
        triage_storage::connection::with_immediate_transaction(conn, |tx| {
            let mut registry = CheckerRegistry::new(tx, Arc::clone(&sleeper))?;
            for identity in &identities {
                registry
                    .resolve(tx, identity, Severity::Unspecified)
                    .ok_or_else(|| contention_error(identity))?;
            }
            Ok(())
        })
    })
}

/// Repoint fake-sentinel reports to their real checkers after commit.
///
/// Runs in its own transaction, after the main one committed, because
/// the real identities are only discovered by reading report files. An
/// identity that still fails to resolve after [`MAX_ATTEMPTS`] fails the
/// store; no report keeps the transient fake identity silently.
pub fn backfill_fake_checkers(
    db: &DatabaseManager,
    sleeper: Arc<dyn Sleeper>,
    pending: Vec<PendingBackfill>,
) -> Result<(), StoreError> {
    if pending.is_empty() {
        return Ok(());
    }

    // Group report ids by identity so each pair resolves once.
    let mut by_identity: FxHashMap<CheckerIdentity, Vec<i64>> = FxHashMap::default();
    for item in pending {
        by_identity.entry(item.identity).or_default().push(item.report_id);
    }

    db.with_writer(|conn| {
        triage_storage::connection::with_immediate_transaction(conn, |tx| {
            let mut registry = CheckerRegistry::new(tx, Arc::clone(&sleeper))?;
            for (identity, report_ids) in &by_identity {
                let target = registry
                    .resolve(tx, identity, Severity::Unspecified)
                    .ok_or_else(|| contention_error(identity))?;
                checkers::repoint_reports(tx, report_ids, target)?;
            }
            Ok(())
        })
    })
}

fn contention_error(identity: &CheckerIdentity) -> StoreError {
    StoreError::CheckerRegistry {
        attempts: MAX_ATTEMPTS,
        message: format!("excessive contention registering {identity}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested sleeps instead of blocking.
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn test_conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        triage_storage::migrations::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn sentinels_exist_after_construction() {
        let conn = test_conn();
        let registry =
            CheckerRegistry::new(&conn, Arc::new(ThreadSleeper)).unwrap();
        let fake = checkers::find_checker(&conn, &CheckerIdentity::fake())
            .unwrap()
            .unwrap();
        assert_eq!(fake.id, registry.fake_id());
        assert!(checkers::find_checker(&conn, &CheckerIdentity::unknown())
            .unwrap()
            .is_some());
    }

    #[test]
    fn resolve_caches_and_reuses_ids() {
        let conn = test_conn();
        let mut registry =
            CheckerRegistry::new(&conn, Arc::new(ThreadSleeper)).unwrap();
        let ident = CheckerIdentity::new("clangsa", "core.DivideZero");
        let first = registry.resolve(&conn, &ident, Severity::High).unwrap();
        let second = registry.resolve(&conn, &ident, Severity::High).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn backoff_doubles_between_attempts() {
        // Drive the retry loop against a connection where the checkers
        // table is gone, so every attempt fails.
        let conn = test_conn();
        let sleeper = Arc::new(RecordingSleeper(Mutex::new(Vec::new())));
        let mut registry = CheckerRegistry::new(&conn, sleeper.clone()).unwrap();
        conn.execute_batch("DROP TABLE checkers").unwrap();

        let ident = CheckerIdentity::new("clangsa", "core.NullDeref");
        assert!(registry.resolve(&conn, &ident, Severity::High).is_none());

        let sleeps = sleeper.0.lock().unwrap();
        assert_eq!(sleeps.as_slice(), &[Duration::from_secs(30), Duration::from_secs(60)]);
    }

    #[test]
    fn metadata_checker_set_is_registered_up_front() {
        let db = DatabaseManager::open_in_memory().unwrap();
        db.with_writer(|conn| triage_storage::migrations::run_migrations(conn))
            .unwrap();

        let identities = vec![
            CheckerIdentity::new("clangsa", "core.DivideZero"),
            CheckerIdentity::new("clang-tidy", "bugprone-use-after-move"),
        ];
        store_checker_identifiers(&db, Arc::new(ThreadSleeper), identities.clone()).unwrap();

        db.with_writer(|conn| {
            for identity in &identities {
                assert!(checkers::find_checker(conn, identity)?.is_some());
            }
            // The sentinels ride along with every registration pass.
            assert!(checkers::find_checker(conn, &CheckerIdentity::fake())?.is_some());
            assert!(checkers::find_checker(conn, &CheckerIdentity::unknown())?.is_some());
            Ok::<_, StorageError>(())
        })
        .unwrap();
    }

    #[test]
    fn backfill_repoints_reports() {
        use triage_storage::queries::{files, reports, runs};
        use triage_core::types::{DetectionStatus, ReviewStatus};

        let db = DatabaseManager::open_in_memory().unwrap();
        let (fake_id, report_id) = db
            .with_writer(|conn| {
                triage_storage::migrations::run_migrations(conn)?;
                let registry = CheckerRegistry::new(conn, Arc::new(ThreadSleeper))?;
                let run_id = runs::insert_run(conn, "r", 100)?;
                files::insert_content(conn, "h1", b"int x;")?;
                let file_id = files::get_or_insert_file(conn, "a.c", "h1")?;
                let report_id = reports::insert_report(
                    conn,
                    &reports::NewReport {
                        run_id,
                        file_id,
                        bug_id: "bug1",
                        checker_id: registry.fake_id(),
                        line: 1,
                        column: 1,
                        message: "m",
                        path_length: 0,
                        detection_status: DetectionStatus::New,
                        review_status: ReviewStatus::Unreviewed,
                        review_status_author: None,
                        review_status_message: None,
                        review_status_date: None,
                        review_status_is_in_source: false,
                        detected_at: 100,
                        fixed_at: None,
                    },
                )?;
                Ok::<_, StorageError>((registry.fake_id(), report_id))
            })
            .unwrap();

        let real = CheckerIdentity::new("clangsa", "core.DivideZero");
        backfill_fake_checkers(
            &db,
            Arc::new(ThreadSleeper),
            vec![PendingBackfill {
                report_id,
                identity: real.clone(),
            }],
        )
        .unwrap();

        db.with_writer(|conn| {
            let stored = reports::find_by_id(conn, report_id)?.unwrap();
            assert_eq!(stored.checker, real);
            let fake_row = checkers::find_checker_by_id(conn, fake_id)?.unwrap();
            assert_eq!(fake_row.checker_name, "__fake_checker__");
            Ok::<_, StorageError>(())
        })
        .unwrap();
    }
}
