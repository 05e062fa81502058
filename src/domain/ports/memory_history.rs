//! In-memory history store.
//!
//! Valid no-durability implementation for tests and for deployments that
//! do not need history across restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::HistoryStore;
use crate::domain::errors::DomainResult;
use crate::domain::models::ConfidenceHistory;

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    histories: RwLock<HashMap<String, ConfidenceHistory>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.histories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.histories.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, entity_id: &str, capacity: usize) -> DomainResult<ConfidenceHistory> {
        let histories = self.histories.read().await;
        Ok(match histories.get(entity_id) {
            Some(stored) => {
                let mut history = stored.clone();
                history.set_capacity(capacity);
                history
            }
            None => ConfidenceHistory::new(entity_id, capacity),
        })
    }

    async fn save(&self, entity_id: &str, history: &ConfidenceHistory) -> DomainResult<()> {
        let mut histories = self.histories.write().await;
        histories.insert(entity_id.to_string(), history.clone());
        Ok(())
    }

    async fn list_entities(&self) -> DomainResult<Vec<String>> {
        let histories = self.histories.read().await;
        let mut ids: Vec<String> = histories.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
