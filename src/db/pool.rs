//! SQLite connection pool with WAL mode.
//!
//! Snapshot reads (directory, compliance dashboards) run concurrently with the
//! single writer that WAL allows. Workflow commands take that writer inside a
//! transaction.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// How long a writer waits on a locked database before SQLite reports BUSY.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a new connection pool with WAL mode enabled.
pub async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    create_pool_with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT).await
}

/// Create a connection pool whose lock waits are bounded by `busy_timeout`.
///
/// A writer blocked longer than this fails with SQLITE_BUSY, which the error
/// layer reports as retryable.
pub async fn create_pool_with_busy_timeout(
    db_path: &Path,
    busy_timeout: Duration,
) -> Result<DbPool, sqlx::Error> {
    let db_url = format!("sqlite:{}", db_path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // mentor_link and request rows reference persons
        .foreign_keys(true)
        .busy_timeout(busy_timeout)
        .pragma("wal_autocheckpoint", "1000");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(busy_timeout)
        .connect_with(connect_options)
        .await?;

    let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;

    debug_assert!(
        mode.0.to_lowercase() == "wal",
        "WAL mode should be enabled, got: {}",
        mode.0
    );

    Ok(pool)
}
