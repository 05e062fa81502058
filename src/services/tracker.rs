//! Per-entity confidence history tracking.
//!
//! The tracker is the in-memory authority for every entity's history. Each
//! entity has its own async mutex, which is the exclusive critical section
//! for append, convergence analysis and write-through persistence, so
//! concurrent results for the same entity never interleave while different
//! entities proceed in parallel.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConfidenceHistory, ConfidenceResult, ConvergenceState, ConvergenceStatus, EventPayload,
    HistoryEntry, TrackerConfig,
};
use crate::domain::ports::HistoryStore;
use crate::services::convergence_detector::{population_variance, ConvergenceDetector};
use crate::services::event_bus::EventBus;

/// A recorded result and the convergence state it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedResult {
    /// The result with its final iteration number.
    pub result: ConfidenceResult,
    pub delta: f64,
    pub convergence: ConvergenceState,
}

#[derive(Debug)]
struct EntityTrack {
    history: ConfidenceHistory,
    state: ConvergenceState,
    hydrated: bool,
}

pub struct Tracker {
    config: TrackerConfig,
    detector: ConvergenceDetector,
    store: Arc<dyn HistoryStore>,
    events: Arc<EventBus>,
    entities: DashMap<String, Arc<Mutex<EntityTrack>>>,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        detector: ConvergenceDetector,
        store: Arc<dyn HistoryStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            detector,
            store,
            events,
            entities: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn detector(&self) -> &ConvergenceDetector {
        &self.detector
    }

    /// Record `result` and return the resulting convergence state.
    pub async fn track(
        &self,
        entity_id: &str,
        result: ConfidenceResult,
    ) -> DomainResult<ConvergenceState> {
        Ok(self.record(entity_id, result).await?.convergence)
    }

    /// Record `result`, assigning its iteration, and analyze convergence.
    ///
    /// Emits `convergence_reached` on every transition into `converged`.
    /// Write-through persistence failures are logged, not returned.
    pub async fn record(
        &self,
        entity_id: &str,
        result: ConfidenceResult,
    ) -> DomainResult<TrackedResult> {
        if entity_id.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "entity_id cannot be empty".to_string(),
            ));
        }
        if result.entity_id != entity_id {
            return Err(DomainError::InvalidInput(format!(
                "result for {} cannot be tracked under {}",
                result.entity_id, entity_id
            )));
        }

        let slot = self.slot(entity_id);
        let mut track = slot.lock().await;
        self.hydrate(entity_id, &mut track).await;

        let entry = track.history.record(result).clone();
        let previous = track.state;
        let state = self.detector.analyze(track.history.as_slice());
        track.state = state;

        tracing::debug!(
            entity_id,
            iteration = entry.iteration(),
            overall = entry.overall(),
            delta = entry.delta,
            status = %state.status,
            reason = %state.reason,
            "Recorded confidence result"
        );

        if state.status == ConvergenceStatus::Converged && !previous.is_converged() {
            tracing::info!(
                entity_id,
                iteration = entry.iteration(),
                confidence_of_convergence = state.confidence_of_convergence,
                "Entity converged"
            );
            self.events.publish(EventPayload::ConvergenceReached {
                entity_id: entity_id.to_string(),
                iteration: entry.iteration(),
                confidence_of_convergence: state.confidence_of_convergence,
            });
        }

        if self.config.write_through {
            if let Err(err) = self.store.save(entity_id, &track.history).await {
                tracing::warn!(
                    entity_id,
                    store = self.store.name(),
                    error = %err,
                    "Write-through save failed; in-memory history stays authoritative"
                );
            }
        }

        Ok(TrackedResult {
            result: entry.result,
            delta: entry.delta,
            convergence: state,
        })
    }

    /// Ordered history entries for `entity_id`, oldest first.
    pub async fn get_history(&self, entity_id: &str) -> Vec<HistoryEntry> {
        match self.existing(entity_id) {
            Some(slot) => slot.lock().await.history.entries(),
            None => Vec::new(),
        }
    }

    /// Cloned history for read-only consumers.
    pub async fn snapshot(&self, entity_id: &str) -> Option<ConfidenceHistory> {
        let slot = self.existing(entity_id)?;
        let track = slot.lock().await;
        Some(track.history.clone())
    }

    /// Last computed convergence state (the default state when unknown).
    pub async fn convergence_state(&self, entity_id: &str) -> ConvergenceState {
        match self.existing(entity_id) {
            Some(slot) => slot.lock().await.state,
            None => ConvergenceState::default(),
        }
    }

    /// True when the entity has no history, its latest score is below the
    /// target confidence, or it is unconverged with high score variance.
    pub async fn needs_reanalysis(&self, entity_id: &str) -> bool {
        let Some(slot) = self.existing(entity_id) else {
            return true;
        };
        let track = slot.lock().await;

        let Some(latest) = track.history.latest() else {
            return true;
        };
        if latest.overall() < self.config.target_confidence {
            return true;
        }

        if track.state.status == ConvergenceStatus::Unconverged {
            let recent: Vec<f64> = track
                .history
                .tail(self.detector.window())
                .iter()
                .map(HistoryEntry::overall)
                .collect();
            return population_variance(&recent) > self.config.reanalysis_variance_threshold;
        }
        false
    }

    /// Replace the in-memory history with the stored one.
    pub async fn load(&self, entity_id: &str) -> DomainResult<ConfidenceHistory> {
        let history = self
            .store
            .load(entity_id, self.config.history_capacity)
            .await?;

        let slot = self.slot(entity_id);
        let mut track = slot.lock().await;
        track.history = history.clone();
        track.state = self.detector.analyze(track.history.as_slice());
        track.hydrated = true;
        Ok(history)
    }

    /// Persist the current in-memory history.
    pub async fn save(&self, entity_id: &str) -> DomainResult<()> {
        let history = match self.existing(entity_id) {
            Some(slot) => slot.lock().await.history.clone(),
            None => ConfidenceHistory::new(entity_id, self.config.history_capacity),
        };
        self.store.save(entity_id, &history).await
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn tracked_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn existing(&self, entity_id: &str) -> Option<Arc<Mutex<EntityTrack>>> {
        self.entities.get(entity_id).map(|slot| Arc::clone(slot.value()))
    }

    fn slot(&self, entity_id: &str) -> Arc<Mutex<EntityTrack>> {
        let capacity = self.config.history_capacity;
        let slot = self.entities.entry(entity_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(EntityTrack {
                history: ConfidenceHistory::new(entity_id, capacity),
                state: ConvergenceState::default(),
                hydrated: false,
            }))
        });
        Arc::clone(slot.value())
    }

    /// First touch loads stored history. Failure leaves the entity empty.
    async fn hydrate(&self, entity_id: &str, track: &mut EntityTrack) {
        if track.hydrated {
            return;
        }
        track.hydrated = true;

        match self.store.load(entity_id, self.config.history_capacity).await {
            Ok(history) => {
                if !history.is_empty() {
                    tracing::debug!(
                        entity_id,
                        entries = history.len(),
                        store = self.store.name(),
                        "Hydrated history from store"
                    );
                }
                track.history = history;
                track.state = self.detector.analyze(track.history.as_slice());
            }
            Err(err) => {
                tracing::warn!(
                    entity_id,
                    store = self.store.name(),
                    error = %err,
                    "Failed to load stored history; starting empty"
                );
            }
        }
    }
}
