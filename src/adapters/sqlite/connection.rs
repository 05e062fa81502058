//! Pool setup for the history database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::StorageConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid history database path: {0}")]
    InvalidPath(String),
    #[error("Failed to create history directory: {0}")]
    Directory(#[source] std::io::Error),
    #[error("Failed to open history database: {0}")]
    Open(#[source] sqlx::Error),
}

/// Open the configured history database, creating the file and its parent
/// directory when missing. The pool is pinged once before it is returned.
pub async fn open_history_pool(storage: &StorageConfig) -> Result<SqlitePool, ConnectionError> {
    let url = storage.database_url();
    ensure_parent_dir(&storage.database_path)?;

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|_| ConnectionError::InvalidPath(storage.database_path.clone()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    // WAL lets readers proceed while the tracker appends.
    let max_connections = storage.max_connections.max(1);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(ConnectionError::Open)?;

    tracing::debug!(path = %storage.database_path, max_connections, "History database open");
    Ok(pool)
}

/// Single-connection in-memory pool. Each call gets a fresh database.
pub async fn memory_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|_| ConnectionError::InvalidPath(":memory:".to_string()))?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

fn ensure_parent_dir(database_path: &str) -> Result<(), ConnectionError> {
    if database_path.is_empty() || database_path == ":memory:" {
        return Ok(());
    }
    match Path::new(database_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(ConnectionError::Directory)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("history.db");
        let storage = StorageConfig {
            database_path: db_path.display().to_string(),
            max_connections: 0,
            ..StorageConfig::default()
        };

        let pool = open_history_pool(&storage).await.unwrap();
        assert_eq!(pool.options().get_max_connections(), 1);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_memory_pools_are_isolated() {
        let first = memory_pool().await.unwrap();
        let second = memory_pool().await.unwrap();
        sqlx::query("CREATE TABLE scratch (id INTEGER)")
            .execute(&first)
            .await
            .unwrap();

        let missing = sqlx::query("SELECT id FROM scratch")
            .fetch_all(&second)
            .await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_memory_path_needs_no_directory() {
        ensure_parent_dir(":memory:").unwrap();
        ensure_parent_dir("history.db").unwrap();
    }
}
