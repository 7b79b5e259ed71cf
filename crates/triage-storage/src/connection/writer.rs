//! Write transaction helper — BEGIN IMMEDIATE, auto-rollback on error.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use triage_core::errors::StorageError;

/// Execute a write operation inside a BEGIN IMMEDIATE transaction.
///
/// IMMEDIATE acquires the write lock at transaction start rather than at
/// first write, so contended stores fail with SQLITE_BUSY up front
/// instead of mid-transaction. `new_unchecked` takes a shared reference,
/// which the serialized-writer design requires. Generic over the error
/// type so higher layers can run their own fallible logic inside the
/// transaction.
pub fn with_immediate_transaction<F, T, E>(conn: &Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<StorageError>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| E::from(StorageError::sqlite(format!("begin immediate: {e}"))))?;

    let result = f(&tx)?;

    tx.commit()
        .map_err(|e| E::from(StorageError::sqlite(format!("commit: {e}"))))?;

    Ok(result)
}
