//! Database module for the mirrored protocol state.
//!
//! This module provides SQLite-based storage for:
//! - Allow-listed token records with ERC-20 metadata
//! - Lending pools and their ordered loan membership
//! - Individual loans with their owning-pool back-reference
//!
//! # Architecture
//!
//! - `models`: Data structures that map to database tables
//! - `repository`: entity operations used by the reconciler and the API
//! - Connection pooling with SQLite WAL mode for concurrency
//! - Migration system for schema versioning

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::IndexerError;

pub mod models;
pub mod repository;

/// Creates a SQLite connection pool with optimized settings.
///
/// # Configuration
///
/// - **WAL mode**: Enables concurrent readers during writes
/// - **Busy timeout**: 30 seconds to handle lock contention
/// - **Max connections**: 5 (suitable for a single-machine indexer)
/// - **Min connections**: 1 (keep one connection warm)
///
/// # Errors
///
/// Returns [`IndexerError::DatabaseError`] if the URL cannot be parsed, the
/// connection fails, or migrations cannot be applied.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, IndexerError> {
    info!(database_url, "Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // Enforcement is per-connection in SQLite, so it must be part of the
        // connect options rather than a one-off pragma on the pool.
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    info!("Running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

/// Runs database migrations to ensure the schema is up-to-date.
///
/// Applies all pending migrations from the `migrations/` directory, in
/// order; migrations are idempotent (safe to run multiple times).
///
/// # Errors
///
/// Returns [`IndexerError::DatabaseError`] if a migration fails to apply.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), IndexerError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            IndexerError::database(
                "Failed to run database migrations".to_string(),
                Some(Box::new(e)),
            )
        })?;

    Ok(())
}

/// Verify that required tables exist after migrations.
///
/// # Errors
///
/// Returns [`IndexerError::DatabaseError`] if any expected table is missing.
pub async fn verify_database(pool: &SqlitePool) -> Result<(), IndexerError> {
    let rows = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT name FROM sqlite_master
        WHERE type='table' AND name IN ('allowed_tokens', 'pools', 'loans', 'pool_loans')
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        IndexerError::database(
            "Failed to verify database schema".to_string(),
            Some(Box::new(e)),
        )
    })?;

    if rows.len() < 4 {
        return Err(IndexerError::database(
            format!(
                "Database schema incomplete. Expected 4 tables, found {}",
                rows.len()
            ),
            None,
        ));
    }

    Ok(())
}
