//! Shadow-mode comparison records and their aggregate metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bounds (exclusive) of the divergence distribution buckets. The
/// final bucket is `[0.25, 1]`.
pub const DIVERGENCE_BUCKET_BOUNDS: [f64; 4] = [0.05, 0.10, 0.15, 0.25];

/// One comparison of the ML score against the baseline for a sampled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowComparison {
    pub entity_id: String,
    pub ml_score: f64,
    pub baseline_score: f64,
    /// `|ml - baseline|`
    pub divergence: f64,
    /// `1 - divergence`
    pub agreement: f64,
    pub timestamp: DateTime<Utc>,
    pub sampled: bool,
}

impl ShadowComparison {
    pub fn new(entity_id: impl Into<String>, ml_score: f64, baseline_score: f64) -> Self {
        let divergence = (baseline_score - ml_score).abs().clamp(0.0, 1.0);
        Self {
            entity_id: entity_id.into(),
            ml_score,
            baseline_score,
            divergence,
            agreement: 1.0 - divergence,
            timestamp: Utc::now(),
            sampled: true,
        }
    }

    /// Index into [`DivergenceBuckets::counts`].
    pub fn bucket(&self) -> usize {
        DIVERGENCE_BUCKET_BOUNDS
            .iter()
            .position(|bound| self.divergence < *bound)
            .unwrap_or(DIVERGENCE_BUCKET_BOUNDS.len())
    }
}

/// Outcome of asking the shadow controller to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowDecision {
    pub sampled: bool,
    /// Present only when the entity was sampled and shadow mode is active.
    pub comparison: Option<ShadowComparison>,
}

impl ShadowDecision {
    pub fn skipped() -> Self {
        Self {
            sampled: false,
            comparison: None,
        }
    }

    pub fn compared(comparison: ShadowComparison) -> Self {
        Self {
            sampled: true,
            comparison: Some(comparison),
        }
    }
}

/// Divergence histogram over the retained comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceBuckets {
    pub counts: [u64; 5],
}

impl DivergenceBuckets {
    pub fn labels() -> [&'static str; 5] {
        ["0.00-0.05", "0.05-0.10", "0.10-0.15", "0.15-0.25", "0.25-1.00"]
    }

    pub fn add(&mut self, comparison: &ShadowComparison) {
        self.counts[comparison.bucket()] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Whether shadow comparisons are currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Shadow comparisons run for sampled entities.
    Closed,
    /// Tripped by sustained divergence (or disabled by config); comparisons
    /// short-circuit until manually re-enabled.
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Aggregate view over the comparison ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowMetrics {
    pub breaker: BreakerState,
    pub total_sampled: u64,
    pub total_skipped: u64,
    /// Comparisons currently held in the ring buffer.
    pub retained: usize,
    pub mean_divergence: f64,
    pub mean_agreement: f64,
    pub buckets: DivergenceBuckets,
    pub alerts_raised: u64,
    pub times_disabled: u64,
    pub consecutive_hard_stop_windows: u32,
}
