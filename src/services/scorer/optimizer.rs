//! Feedback-driven weight adjustment.
//!
//! One bounded gradient-ascent step per batch. Repeated calls may drift;
//! there is no decay and no convergence check.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConfidenceResult, Dimension, DimensionScores, DimensionWeights, OptimizerConfig,
};

/// One `(predicted, actual)` pair plus the dimension scores behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSample {
    pub predicted: f64,
    pub actual: f64,
    pub scores: DimensionScores,
}

impl FeedbackSample {
    pub fn new(predicted: f64, actual: f64, scores: DimensionScores) -> Self {
        Self {
            predicted,
            actual,
            scores,
        }
    }

    /// Feedback on a previously produced result.
    pub fn from_result(result: &ConfidenceResult, actual: f64) -> Self {
        Self::new(result.overall, actual, result.dimensions)
    }

    pub fn error(&self) -> f64 {
        self.actual - self.predicted
    }
}

#[derive(Debug, Clone, Default)]
pub struct WeightOptimizer {
    config: OptimizerConfig,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Per-dimension gradient: mean of `error * score` over the batch.
    pub fn gradient(&self, feedback: &[FeedbackSample]) -> DomainResult<DimensionWeights> {
        if feedback.is_empty() {
            return Err(DomainError::InvalidInput(
                "feedback batch cannot be empty".to_string(),
            ));
        }
        if let Some(bad) = feedback
            .iter()
            .find(|f| !f.predicted.is_finite() || !f.actual.is_finite())
        {
            return Err(DomainError::InvalidInput(format!(
                "feedback values must be finite (predicted {}, actual {})",
                bad.predicted, bad.actual
            )));
        }

        let n = feedback.len() as f64;
        let mut gradient = DimensionWeights::new(0.0, 0.0, 0.0, 0.0);
        for dimension in Dimension::ALL {
            let total: f64 = feedback
                .iter()
                .map(|f| f.error() * f.scores.get(dimension))
                .sum();
            gradient.set(dimension, total / n);
        }
        Ok(gradient)
    }

    /// `w += learning_rate * gradient`, clamp to the configured bounds,
    /// renormalize.
    pub fn optimize(
        &self,
        weights: &DimensionWeights,
        feedback: &[FeedbackSample],
    ) -> DomainResult<DimensionWeights> {
        let gradient = self.gradient(feedback)?;

        let mut updated = *weights;
        for dimension in Dimension::ALL {
            let stepped =
                weights.get(dimension) + self.config.learning_rate * gradient.get(dimension);
            updated.set(
                dimension,
                stepped.clamp(self.config.min_weight, self.config.max_weight),
            );
        }

        let normalized = updated.normalized_or(weights);
        tracing::debug!(
            samples = feedback.len(),
            semantic = normalized.semantic,
            categorical = normalized.categorical,
            structural = normalized.structural,
            temporal = normalized.temporal,
            "Applied weight optimization step"
        );
        Ok(normalized)
    }
}
