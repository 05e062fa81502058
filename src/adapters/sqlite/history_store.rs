//! SQLite implementation of the HistoryStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::connection::open_history_pool;
use super::migrations::{all_embedded_migrations, Migrator};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ConfidenceHistory, HistoryEntry, StorageConfig};
use crate::domain::ports::HistoryStore;

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the configured database and migrate it.
    pub async fn connect(storage: &StorageConfig) -> DomainResult<Self> {
        let pool = open_history_pool(storage)
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))?;
        Self::migrated(pool).await
    }

    /// Run embedded migrations on `pool` and wrap it.
    pub async fn migrated(pool: SqlitePool) -> DomainResult<Self> {
        let applied = Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .map_err(|e| DomainError::Persistence(e.to_string()))?;
        if applied > 0 {
            tracing::info!(applied, "History schema migrated");
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    entity_id: String,
    capacity: i64,
    entries_json: String,
}

fn row_to_history(row: HistoryRow, capacity: usize) -> DomainResult<ConfidenceHistory> {
    let entries: Vec<HistoryEntry> = serde_json::from_str(&row.entries_json)?;
    tracing::trace!(
        entity_id = %row.entity_id,
        stored_capacity = row.capacity,
        capacity,
        entries = entries.len(),
        "Loaded history row"
    );
    Ok(ConfidenceHistory::from_entries(row.entity_id, capacity, entries))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, entity_id: &str, capacity: usize) -> DomainResult<ConfidenceHistory> {
        let row: Option<HistoryRow> = sqlx::query_as(
            "SELECT entity_id, capacity, entries_json FROM confidence_histories WHERE entity_id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_history(row, capacity),
            None => Ok(ConfidenceHistory::new(entity_id, capacity)),
        }
    }

    async fn save(&self, entity_id: &str, history: &ConfidenceHistory) -> DomainResult<()> {
        let entries_json = serde_json::to_string(&history.entries())?;
        let latest = history.latest();
        let capacity = i64::try_from(history.capacity)
            .map_err(|_| DomainError::InvalidInput(format!("capacity {} too large", history.capacity)))?;
        let latest_iteration = latest.map_or(0, |entry| {
            i64::try_from(entry.iteration()).unwrap_or(i64::MAX)
        });

        sqlx::query(
            r"INSERT INTO confidence_histories
               (entity_id, capacity, entries_json, latest_iteration, latest_overall, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(entity_id) DO UPDATE SET
               capacity = excluded.capacity,
               entries_json = excluded.entries_json,
               latest_iteration = excluded.latest_iteration,
               latest_overall = excluded.latest_overall,
               updated_at = excluded.updated_at",
        )
        .bind(entity_id)
        .bind(capacity)
        .bind(&entries_json)
        .bind(latest_iteration)
        .bind(latest.map(HistoryEntry::overall))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_entities(&self) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT entity_id FROM confidence_histories ORDER BY entity_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::memory_pool;
    use crate::domain::models::confidence::test_support::result_with;

    async fn store() -> SqliteHistoryStore {
        let pool = memory_pool().await.unwrap();
        SqliteHistoryStore::migrated(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_entity_loads_empty() {
        let store = store().await;
        let history = store.load("nobody", 10).await.unwrap();
        assert!(history.is_empty());
        assert_eq!(history.capacity, 10);
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_iterations() {
        let store = store().await;
        let mut history = ConfidenceHistory::new("doc", 3);
        for score in [0.5, 0.6, 0.7, 0.8] {
            history.record(result_with("doc", score));
        }
        store.save("doc", &history).await.unwrap();

        let loaded = store.load("doc", 3).await.unwrap();
        assert_eq!(loaded, history);
        let iterations: Vec<u64> = loaded.iter().map(HistoryEntry::iteration).collect();
        assert_eq!(iterations, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let store = store().await;
        let mut history = ConfidenceHistory::new("doc", 10);
        history.record(result_with("doc", 0.5));
        store.save("doc", &history).await.unwrap();
        history.record(result_with("doc", 0.9));
        store.save("doc", &history).await.unwrap();

        let loaded = store.load("doc", 10).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.list_entities().await.unwrap(), vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_load_with_smaller_capacity_keeps_newest() {
        let store = store().await;
        let mut history = ConfidenceHistory::new("doc", 10);
        for score in [0.1, 0.2, 0.3, 0.4] {
            history.record(result_with("doc", score));
        }
        store.save("doc", &history).await.unwrap();

        let loaded = store.load("doc", 2).await.unwrap();
        assert_eq!(loaded.overall_scores(), vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_serialization_error() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO confidence_histories (entity_id, capacity, entries_json) VALUES ('doc', 5, 'nope')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.load("doc", 5).await.unwrap_err();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }
}
