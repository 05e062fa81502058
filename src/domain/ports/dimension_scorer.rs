//! Pluggable per-dimension scoring functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AnalysisInput, Dimension, ScoringConfig};

/// Context shared by every sub-scorer within one scoring call.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Clock reading taken once at the start of scoring.
    pub now: DateTime<Utc>,
    pub config: ScoringConfig,
}

impl ScoringContext {
    pub fn new(now: DateTime<Utc>, config: ScoringConfig) -> Self {
        Self { now, config }
    }
}

/// Scores one dimension of an input.
///
/// Implementations return a value in `[0,1]`. Errors and timeouts are
/// absorbed by the scorer, which substitutes the neutral score, so an
/// implementation should fail rather than guess.
#[async_trait]
pub trait DimensionScorer: Send + Sync {
    /// Which dimension this scorer produces.
    fn dimension(&self) -> Dimension;

    async fn score(&self, input: &AnalysisInput, ctx: &ScoringContext) -> DomainResult<f64>;
}
