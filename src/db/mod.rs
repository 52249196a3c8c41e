//! Database layer for the record store.
//!
//! This module handles all database operations including:
//! - Connection pool management with WAL mode
//! - Schema migrations
//! - Per-call timeouts for store I/O
//! - Query helpers for persons, reassignment requests and reviews

pub mod persons;
pub mod pool;
pub mod requests;
pub mod reviews;

use crate::error::AppError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database not initialized")]
    NotInitialized,
}

/// Ordered list of migrations. Each runs once and is recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial_schema",
    include_str!("migrations/0001_initial_schema.sql"),
)];

/// Get the path to the SQLite database file inside a data directory.
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("mentorship.db")
}

/// Initialize the database: create the file if needed and run migrations.
///
/// # Arguments
/// * `db_path` - Path to the SQLite database file
///
/// # Returns
/// A connection pool configured with WAL mode
pub async fn initialize(db_path: &Path) -> Result<pool::DbPool, DbError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            DbError::Migration(format!("Failed to create database directory: {}", e))
        })?;
    }

    let pool = pool::create_pool(db_path).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run all pending database migrations.
async fn run_migrations(pool: &pool::DbPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

        if applied.is_some() {
            continue;
        }

        // A migration and its bookkeeping row commit together.
        let mut tx = sqlx::Connection::begin(&mut *conn).await?;
        for statement in parse_sql_statements(sql) {
            sqlx::query(&statement).execute(&mut *tx).await.map_err(|e| {
                DbError::Migration(format!("{} failed: {}", name, e))
            })?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        log::info!("[db] Applied migration {}", name);
    }

    Ok(())
}

/// Parse SQL statements from a migration file.
///
/// This handles:
/// - Comments (lines starting with --)
/// - Semicolons inside parentheses (e.g., `strftime('%s', 'now')`)
/// - Multi-line statements
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current_statement = String::new();
    let mut paren_depth: i32 = 0;

    for line in sql.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("--") {
            continue;
        }

        let line_without_comment = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };

        for ch in line_without_comment.chars() {
            match ch {
                '(' => {
                    paren_depth += 1;
                    current_statement.push(ch);
                }
                ')' => {
                    paren_depth = paren_depth.saturating_sub(1);
                    current_statement.push(ch);
                }
                ';' if paren_depth == 0 => {
                    let stmt = current_statement.trim().to_string();
                    if !stmt.is_empty() {
                        statements.push(stmt);
                    }
                    current_statement.clear();
                }
                _ => current_statement.push(ch),
            }
        }

        if !current_statement.is_empty() {
            current_statement.push(' ');
        }
    }

    let final_stmt = current_statement.trim().to_string();
    if !final_stmt.is_empty() {
        statements.push(final_stmt);
    }

    statements
}

/// Run a store operation under a deadline.
///
/// An elapsed deadline drops the future, which rolls back any open
/// transaction, and surfaces as [`AppError::Unavailable`].
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("[db] {} timed out after {:?}", operation, limit);
            Err(AppError::unavailable(format!(
                "{} timed out after {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}

/// Whether a sqlx error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Get the current Unix timestamp.
pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::pool::DbPool;

    /// Fresh migrated database in a temporary directory.
    pub async fn setup_test_db() -> DbPool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        // Keep the dir alive by leaking it (for test purposes)
        std::mem::forget(dir);

        super::initialize(&db_path).await.unwrap()
    }
}
