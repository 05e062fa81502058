//! History store port for durable confidence histories.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ConfidenceHistory;

/// Repository interface for per-entity confidence history.
///
/// The tracker stays the in-memory authority; a store only provides
/// durability across restarts. Implementations map their failures to
/// [`DomainError::Persistence`](crate::domain::errors::DomainError::Persistence).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store name for logging (e.g., "sqlite", "memory").
    fn name(&self) -> &'static str;

    /// Load the history for an entity. A missing entity yields an empty
    /// history with the given capacity.
    async fn load(&self, entity_id: &str, capacity: usize) -> DomainResult<ConfidenceHistory>;

    /// Persist or replace the history for an entity.
    async fn save(&self, entity_id: &str, history: &ConfidenceHistory) -> DomainResult<()>;

    /// Entity ids with stored history.
    async fn list_entities(&self) -> DomainResult<Vec<String>>;
}
