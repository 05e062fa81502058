//! Shared dimension weights as a versioned copy-on-write snapshot.
//!
//! Workers clone the current `Arc<WeightSnapshot>` and score against it;
//! the optimizer builds a new snapshot and swaps the pointer. A reader
//! never sees a partially updated weight set.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::errors::DomainResult;
use crate::domain::models::DimensionWeights;
use crate::services::scorer::{FeedbackSample, WeightOptimizer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    /// Incremented on every publish, starting at 0.
    pub version: u64,
    pub weights: DimensionWeights,
}

#[derive(Debug)]
pub struct WeightStore {
    current: RwLock<Arc<WeightSnapshot>>,
}

impl WeightStore {
    /// Start at version 0 with `weights` normalized.
    pub fn new(weights: DimensionWeights) -> Self {
        Self {
            current: RwLock::new(Arc::new(WeightSnapshot {
                version: 0,
                weights: weights.normalized(),
            })),
        }
    }

    pub fn snapshot(&self) -> Arc<WeightSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the weights, bumping the version.
    pub fn publish(&self, weights: DimensionWeights) -> Arc<WeightSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(WeightSnapshot {
            version: current.version + 1,
            weights: weights.normalized_or(&current.weights),
        });
        *current = Arc::clone(&next);
        tracing::info!(version = next.version, "Published new dimension weights");
        next
    }

    /// Run one optimizer step against the current weights and publish the
    /// result. The store is unchanged when the batch is rejected.
    pub fn apply_feedback(
        &self,
        optimizer: &WeightOptimizer,
        feedback: &[FeedbackSample],
    ) -> DomainResult<Arc<WeightSnapshot>> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let weights = optimizer.optimize(&current.weights, feedback)?;
        let next = Arc::new(WeightSnapshot {
            version: current.version + 1,
            weights,
        });
        *current = Arc::clone(&next);
        tracing::info!(
            version = next.version,
            samples = feedback.len(),
            "Applied feedback to dimension weights"
        );
        Ok(next)
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(DimensionWeights::default())
    }
}
