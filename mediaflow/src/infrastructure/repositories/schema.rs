// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema helpers shared by repository implementations.
//!
//! Applies migrations on start-up so integration tests and services see a
//! consistent database.

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Runs pending migrations against the provided SQLite pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("ensuring database schema is up to date");

    // sqlx tracks applied migrations; re-running is a no-op.
    sqlx::migrate!("../migrations").run(pool).await?;

    info!("database schema is up to date");
    Ok(())
}

/// Creates the SQLite database file if it doesn't exist. `SqlitePool::connect`
/// fails on a missing file unless told to create it.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!(url = database_url, "database does not exist, creating");
        sqlx::Sqlite::create_database(database_url).await?;
        info!(url = database_url, "created new SQLite database");
    }
    Ok(())
}

/// Creates (if needed), connects, and migrates - the start-up path.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema, for tests.
///
/// A pooled `:memory:` database gets one private database per connection, so
/// the pool is pinned to a single connection.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_has_schema() {
        let pool = memory_pool().await.unwrap();
        let tables: i32 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('users', 'recordings', 'processing_stages', 'stage_timings', 'automation_jobs')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 5);
    }

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let pool = memory_pool().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_database_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/mediaflow.db", dir.path().display());
        let pool = initialize_database(&url).await.unwrap();

        let count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'recordings'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
