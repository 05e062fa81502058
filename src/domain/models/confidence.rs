//! Confidence results and the bounded per-entity history they accumulate in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::weights::{Dimension, DimensionWeights};

/// Neutral score substituted for a dimension that could not be computed.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Default number of entries retained per entity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Per-dimension scores, each in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub semantic: f64,
    pub categorical: f64,
    pub structural: f64,
    pub temporal: f64,
}

impl Default for DimensionScores {
    fn default() -> Self {
        Self::neutral()
    }
}

impl DimensionScores {
    pub const fn neutral() -> Self {
        Self {
            semantic: NEUTRAL_SCORE,
            categorical: NEUTRAL_SCORE,
            structural: NEUTRAL_SCORE,
            temporal: NEUTRAL_SCORE,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Semantic => self.semantic,
            Dimension::Categorical => self.categorical,
            Dimension::Structural => self.structural,
            Dimension::Temporal => self.temporal,
        }
    }

    pub fn set(&mut self, dimension: Dimension, score: f64) {
        match dimension {
            Dimension::Semantic => self.semantic = score,
            Dimension::Categorical => self.categorical = score,
            Dimension::Structural => self.structural = score,
            Dimension::Temporal => self.temporal = score,
        }
    }

    /// Weighted average over the dimensions that carry weight.
    ///
    /// Returns the neutral score when no weight is applied at all.
    pub fn weighted_overall(&self, weights: &DimensionWeights) -> f64 {
        let (numerator, applied) = Dimension::ALL
            .iter()
            .map(|d| (self.get(*d), weights.get(*d)))
            .filter(|(_, w)| *w > 0.0)
            .fold((0.0, 0.0), |(num, den), (s, w)| (num + s * w, den + w));

        if applied <= 0.0 {
            NEUTRAL_SCORE
        } else {
            (numerator / applied).clamp(0.0, 1.0)
        }
    }
}

/// Why a dimension fell back to [`NEUTRAL_SCORE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    Error,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFallback {
    pub dimension: Dimension,
    pub kind: FallbackKind,
    pub reason: String,
}

/// Output of one scoring call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub entity_id: String,
    pub dimensions: DimensionScores,
    pub overall: f64,
    /// The (adapted) weights actually applied.
    pub weights: DimensionWeights,
    /// Version of the shared weight snapshot scoring started from.
    #[serde(default)]
    pub weights_version: u64,
    /// Iteration for this entity. Provisional until the tracker records it.
    pub iteration: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub fallbacks: Vec<DimensionFallback>,
}

impl ConfidenceResult {
    pub fn is_degraded(&self) -> bool {
        !self.fallbacks.is_empty()
    }

    pub fn timed_out(&self, dimension: Dimension) -> bool {
        self.fallbacks
            .iter()
            .any(|f| f.dimension == dimension && f.kind == FallbackKind::Timeout)
    }
}

/// A recorded result plus its change from the previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub result: ConfidenceResult,
    /// `overall - previous.overall`, 0 for the first entry.
    pub delta: f64,
}

impl HistoryEntry {
    pub fn overall(&self) -> f64 {
        self.result.overall
    }

    pub fn iteration(&self) -> u64 {
        self.result.iteration
    }
}

/// Append-only, capacity-bounded history for one entity. Oldest entries are
/// evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceHistory {
    pub entity_id: String,
    pub capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl ConfidenceHistory {
    pub fn new(entity_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entity_id: entity_id.into(),
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    /// Rebuild a history from persisted entries (oldest first), keeping
    /// their iterations and deltas. Excess entries are evicted oldest first.
    pub fn from_entries(
        entity_id: impl Into<String>,
        capacity: usize,
        entries: Vec<HistoryEntry>,
    ) -> Self {
        let mut history = Self {
            entity_id: entity_id.into(),
            capacity: capacity.max(1),
            entries: entries.into(),
        };
        history.set_capacity(capacity);
        history
    }

    /// Record `result`, assigning the next iteration number and delta.
    ///
    /// The iteration continues from the latest entry, so numbering stays
    /// monotonic after eviction.
    pub fn record(&mut self, mut result: ConfidenceResult) -> &HistoryEntry {
        let (iteration, delta) = match self.entries.back() {
            Some(last) => (last.iteration() + 1, result.overall - last.overall()),
            None => (1, 0.0),
        };
        result.iteration = iteration;

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { result, delta });
        &self.entries[self.entries.len() - 1]
    }

    /// Change the retention limit, evicting the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Entries in order, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Contiguous view of the entries, oldest first.
    pub fn as_slice(&mut self) -> &[HistoryEntry] {
        self.entries.make_contiguous()
    }

    /// The most recent `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn overall_scores(&self) -> Vec<f64> {
        self.entries.iter().map(HistoryEntry::overall).collect()
    }
}
