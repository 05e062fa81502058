//! Scoring dimensions and the weight set that combines them.
//!
//! Invariants:
//! - Each weight is finite and non-negative
//! - A normalized weight set sums to 1.0 within [`WEIGHT_SUM_TOLERANCE`]
//! - Normalizing a degenerate set (all zero, non-finite) yields the fallback set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed deviation of a normalized weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One of the four independent facets contributing to overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Semantic,
    Categorical,
    Structural,
    Temporal,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Semantic,
        Dimension::Categorical,
        Dimension::Structural,
        Dimension::Temporal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Categorical => "categorical",
            Self::Structural => "structural",
            Self::Temporal => "temporal",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Semantic => 0,
            Self::Categorical => 1,
            Self::Structural => 2,
            Self::Temporal => 3,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight per dimension. Serializes as a `name -> weight` map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub semantic: f64,
    pub categorical: f64,
    pub structural: f64,
    pub temporal: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.35,
            categorical: 0.25,
            structural: 0.20,
            temporal: 0.20,
        }
    }
}

impl DimensionWeights {
    pub const fn new(semantic: f64, categorical: f64, structural: f64, temporal: f64) -> Self {
        Self {
            semantic,
            categorical,
            structural,
            temporal,
        }
    }

    /// Equal weight for every dimension.
    pub const fn uniform() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Semantic => self.semantic,
            Dimension::Categorical => self.categorical,
            Dimension::Structural => self.structural,
            Dimension::Temporal => self.temporal,
        }
    }

    pub fn set(&mut self, dimension: Dimension, weight: f64) {
        match dimension {
            Dimension::Semantic => self.semantic = weight,
            Dimension::Categorical => self.categorical = weight,
            Dimension::Structural => self.structural = weight,
            Dimension::Temporal => self.temporal = weight,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL.iter().map(move |d| (*d, self.get(*d)))
    }

    pub fn sum(&self) -> f64 {
        self.semantic + self.categorical + self.structural + self.temporal
    }

    pub fn is_normalized(&self) -> bool {
        self.iter().all(|(_, w)| w.is_finite() && w >= 0.0)
            && (self.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE
    }

    /// Rescale so the weights sum to 1.0.
    ///
    /// Negative or non-finite entries are treated as zero. If nothing
    /// positive remains, `fallback` is normalized and returned instead, and
    /// if that is degenerate too the uniform set is used.
    pub fn normalized_or(&self, fallback: &DimensionWeights) -> DimensionWeights {
        match self.try_normalize() {
            Some(w) => w,
            None => fallback.try_normalize().unwrap_or_else(Self::uniform),
        }
    }

    /// Normalize against the built-in default weights.
    pub fn normalized(&self) -> DimensionWeights {
        self.normalized_or(&Self::default())
    }

    fn try_normalize(&self) -> Option<DimensionWeights> {
        let mut cleaned = *self;
        for dimension in Dimension::ALL {
            let w = cleaned.get(dimension);
            if !w.is_finite() || w < 0.0 {
                cleaned.set(dimension, 0.0);
            }
        }

        let sum = cleaned.sum();
        if sum <= 0.0 || !sum.is_finite() {
            return None;
        }

        for dimension in Dimension::ALL {
            cleaned.set(dimension, cleaned.get(dimension) / sum);
        }
        Some(cleaned)
    }
}
