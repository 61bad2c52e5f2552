//! Connection handling for the `SQLite` backend.
//!
//! Mutex poison recovery, pragma configuration and mapping of `rusqlite`
//! errors onto the contract's error variants.

use crate::Error;
use crate::observability::metrics::SQLITE_POISON_RECOVERY_TOTAL;
use rusqlite::{Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. Every write runs in a
/// transaction, so an interrupted one was rolled back by `SQLite`.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!(SQLITE_POISON_RECOVERY_TOTAL).increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits for locks instead of failing immediately
/// - **`foreign_keys`**: off; referential integrity is checked at ingest
pub fn configure_connection(conn: &Connection, busy_timeout_ms: u64, read_only: bool) {
    // journal_mode returns a row, so pragma_update errors are expected and ignored
    if !read_only {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    }
    let _ = conn.pragma_update(None, "busy_timeout", busy_timeout_ms.to_string());
}

/// Maps a `rusqlite` error onto the contract's error variants.
///
/// Errors meaning the database cannot be reached (open, I/O, lock contention,
/// not a database) become [`Error::BackendUnavailable`]; everything else is a
/// failed query.
pub fn classify_sqlite_error(operation: &str, err: &rusqlite::Error) -> Error {
    let unavailable = matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::PermissionDenied
                | ErrorCode::OutOfMemory
        )
    );
    if unavailable {
        Error::BackendUnavailable {
            backend: "sqlite".to_string(),
            cause: format!("{operation}: {err}"),
        }
    } else {
        Error::QueryFailed {
            operation: operation.to_string(),
            cause: err.to_string(),
        }
    }
}
