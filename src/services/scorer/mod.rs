//! Multi-dimensional confidence scorer.
//!
//! Runs the four sub-scorers concurrently, each bounded by the per-call
//! timeout, and combines their outputs with adaptively perturbed weights.
//! A failing, panicking or slow sub-scorer never fails the call: its dimension gets
//! [`NEUTRAL_SCORE`] and the substitution is recorded in
//! [`ConfidenceResult::fallbacks`].
//!
//! The scorer is stateless; caching, history and weight updates belong to
//! the caller.

pub mod cache;
pub mod dimensions;
pub mod optimizer;

pub use cache::ResultCache;
pub use dimensions::{CategoricalScorer, SemanticScorer, StructuralScorer, TemporalScorer};
pub use optimizer::{FeedbackSample, WeightOptimizer};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnalysisInput, ConfidenceResult, Dimension, DimensionFallback, DimensionScores,
    DimensionWeights, FallbackKind, ScoringConfig, NEUTRAL_SCORE,
};
use crate::domain::ports::{DimensionScorer, EmbeddingProvider, ScoringContext};

pub struct Scorer {
    config: ScoringConfig,
    /// Indexed by [`Dimension::index`].
    scorers: [Arc<dyn DimensionScorer>; 4],
}

impl Scorer {
    /// Scorer with the built-in sub-scorers.
    pub fn new(config: ScoringConfig, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            scorers: [
                Arc::new(SemanticScorer::new(embeddings)),
                Arc::new(CategoricalScorer),
                Arc::new(StructuralScorer),
                Arc::new(TemporalScorer),
            ],
        }
    }

    /// Replace the sub-scorer for the dimension `scorer` reports.
    pub fn with_scorer(mut self, scorer: Arc<dyn DimensionScorer>) -> Self {
        let index = scorer.dimension().index();
        self.scorers[index] = scorer;
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score `input` against `weights` at the current time.
    pub async fn score(
        &self,
        input: &AnalysisInput,
        weights: &DimensionWeights,
    ) -> DomainResult<ConfidenceResult> {
        self.score_at(input, weights, Utc::now()).await
    }

    /// Score with an explicit clock.
    ///
    /// Only invalid input is surfaced as an error; the returned iteration is
    /// provisional until the tracker records the result.
    pub async fn score_at(
        &self,
        input: &AnalysisInput,
        weights: &DimensionWeights,
        now: DateTime<Utc>,
    ) -> DomainResult<ConfidenceResult> {
        input.validate()?;

        let applied = self.adapt_weights(input, weights, now);
        let ctx = ScoringContext::new(now, self.config.clone());
        let timeout = self.config.per_call_timeout();

        let calls = self.scorers.iter().map(|scorer| {
            let ctx = &ctx;
            async move {
                let call = AssertUnwindSafe(scorer.score(input, ctx)).catch_unwind();
                let outcome = tokio::time::timeout(timeout, call).await;
                (scorer.dimension(), outcome)
            }
        });

        let mut dimensions = DimensionScores::neutral();
        let mut fallbacks = Vec::new();
        for (dimension, outcome) in join_all(calls).await {
            let fallback = match outcome {
                Ok(Ok(Ok(score))) if score.is_finite() => {
                    dimensions.set(dimension, score.clamp(0.0, 1.0));
                    None
                }
                Ok(Ok(Ok(score))) => {
                    Some((FallbackKind::Error, format!("non-finite score {score}")))
                }
                Ok(Ok(Err(err))) => Some((FallbackKind::Error, err.to_string())),
                Ok(Err(panic)) => Some((
                    FallbackKind::Error,
                    format!("panicked: {}", panic_message(panic.as_ref())),
                )),
                Err(_) => Some((
                    FallbackKind::Timeout,
                    format!("no result within {}ms", timeout.as_millis()),
                )),
            };

            if let Some((kind, reason)) = fallback {
                tracing::warn!(
                    entity_id = %input.entity_id,
                    dimension = %dimension,
                    ?kind,
                    reason = %reason,
                    "Sub-scorer failed, using neutral score"
                );
                dimensions.set(dimension, NEUTRAL_SCORE);
                fallbacks.push(DimensionFallback {
                    dimension,
                    kind,
                    reason,
                });
            }
        }

        let overall = dimensions.weighted_overall(&applied);
        tracing::debug!(
            entity_id = %input.entity_id,
            overall,
            degraded = !fallbacks.is_empty(),
            "Scored input"
        );

        Ok(ConfidenceResult {
            entity_id: input.entity_id.clone(),
            dimensions,
            overall,
            weights: applied,
            weights_version: 0,
            iteration: 0,
            created_at: now,
            fallbacks,
        })
    }

    /// Deterministically perturb `weights` for this input, then renormalize.
    ///
    /// - short content moves part of the semantic weight to structural
    /// - no categories zeroes the categorical weight
    /// - stale content boosts the temporal weight
    pub fn adapt_weights(
        &self,
        input: &AnalysisInput,
        weights: &DimensionWeights,
        now: DateTime<Utc>,
    ) -> DimensionWeights {
        let mut adapted = weights.normalized_or(&self.config.default_weights);

        if input.word_count() < self.config.min_word_count {
            let shift = adapted.semantic * self.config.short_content_shift.clamp(0.0, 1.0);
            adapted.semantic -= shift;
            adapted.structural += shift;
        }

        if !input.has_categories() {
            adapted.categorical = 0.0;
        }

        if input.temporal.age_days(now) > self.config.stale_after_days {
            adapted.temporal *= self.config.stale_temporal_boost;
        }

        adapted.normalized_or(&self.config.default_weights)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use crate::domain::models::{StructuralFlags, TemporalMetadata};
    use crate::domain::ports::NullEmbeddingProvider;
    use async_trait::async_trait;
    use chrono::Duration;

    struct Failing(Dimension);

    #[async_trait]
    impl DimensionScorer for Failing {
        fn dimension(&self) -> Dimension {
            self.0
        }

        async fn score(&self, _: &AnalysisInput, _: &ScoringContext) -> DomainResult<f64> {
            Err(DomainError::scoring(self.0, "boom"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl DimensionScorer for Panicking {
        fn dimension(&self) -> Dimension {
            Dimension::Categorical
        }

        async fn score(&self, _: &AnalysisInput, _: &ScoringContext) -> DomainResult<f64> {
            panic!("plugin bug")
        }
    }

    struct Slow;

    #[async_trait]
    impl DimensionScorer for Slow {
        fn dimension(&self) -> Dimension {
            Dimension::Temporal
        }

        async fn score(&self, _: &AnalysisInput, _: &ScoringContext) -> DomainResult<f64> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(1.0)
        }
    }

    struct Constant(Dimension, f64);

    #[async_trait]
    impl DimensionScorer for Constant {
        fn dimension(&self) -> Dimension {
            self.0
        }

        async fn score(&self, _: &AnalysisInput, _: &ScoringContext) -> DomainResult<f64> {
            Ok(self.1)
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(ScoringConfig::default(), Arc::new(NullEmbeddingProvider::new()))
    }

    fn long_text() -> String {
        (0..120).map(|i| format!("token{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_malformed_embedding_falls_back_to_neutral() {
        let input = AnalysisInput::new("doc", long_text())
            .with_embedding(vec![f32::NAN, 1.0])
            .with_categories(vec!["guide".into()], 0.9);

        let result = scorer().score(&input, &DimensionWeights::default()).await.unwrap();
        assert_eq!(result.dimensions.semantic, NEUTRAL_SCORE);
        assert_eq!(result.fallbacks.len(), 1);
        assert_eq!(result.fallbacks[0].dimension, Dimension::Semantic);
        assert_eq!(result.fallbacks[0].kind, FallbackKind::Error);
        assert!((0.0..=1.0).contains(&result.overall));
    }

    #[tokio::test]
    async fn test_invalid_input_is_surfaced() {
        let input = AnalysisInput::new("   ", "text");
        let err = scorer().score(&input, &DimensionWeights::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_failing_scorer_is_recorded() {
        let scorer = scorer().with_scorer(Arc::new(Failing(Dimension::Structural)));
        let input = AnalysisInput::new("doc", "short");
        let result = scorer.score(&input, &DimensionWeights::default()).await.unwrap();
        assert_eq!(result.dimensions.structural, NEUTRAL_SCORE);
        assert!(result
            .fallbacks
            .iter()
            .any(|f| f.dimension == Dimension::Structural && f.kind == FallbackKind::Error));
    }

    #[tokio::test]
    async fn test_panicking_scorer_falls_back_to_neutral() {
        let scorer = scorer().with_scorer(Arc::new(Panicking));
        let input = AnalysisInput::new("doc", long_text())
            .with_categories(vec!["guide".into()], 0.9);
        let result = scorer.score(&input, &DimensionWeights::default()).await.unwrap();

        assert_eq!(result.dimensions.categorical, NEUTRAL_SCORE);
        let fallback = result
            .fallbacks
            .iter()
            .find(|f| f.dimension == Dimension::Categorical)
            .unwrap();
        assert_eq!(fallback.kind, FallbackKind::Error);
        assert!(fallback.reason.contains("plugin bug"));
        assert!((0.0..=1.0).contains(&result.overall));
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_scorer_times_out() {
        let scorer = scorer().with_scorer(Arc::new(Slow));
        let input = AnalysisInput::new("doc", "short");
        let result = scorer.score(&input, &DimensionWeights::default()).await.unwrap();
        assert!(result.timed_out(Dimension::Temporal));
        assert_eq!(result.dimensions.temporal, NEUTRAL_SCORE);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_clamped() {
        let scorer = scorer()
            .with_scorer(Arc::new(Constant(Dimension::Structural, 7.0)))
            .with_scorer(Arc::new(Constant(Dimension::Temporal, f64::NAN)));
        let input = AnalysisInput::new("doc", "short");
        let result = scorer.score(&input, &DimensionWeights::default()).await.unwrap();
        assert_eq!(result.dimensions.structural, 1.0);
        assert_eq!(result.dimensions.temporal, NEUTRAL_SCORE);
        assert!(!result.timed_out(Dimension::Temporal));
        assert!(result.is_degraded());
    }

    #[tokio::test]
    async fn test_overall_is_weighted_average() {
        let scorer = scorer()
            .with_scorer(Arc::new(Constant(Dimension::Semantic, 1.0)))
            .with_scorer(Arc::new(Constant(Dimension::Categorical, 0.0)))
            .with_scorer(Arc::new(Constant(Dimension::Structural, 0.5)))
            .with_scorer(Arc::new(Constant(Dimension::Temporal, 0.5)));
        let input = AnalysisInput::new("doc", long_text())
            .with_categories(vec!["a".into()], 1.0)
            .with_structure(StructuralFlags::default());
        let weights = DimensionWeights::uniform();
        let result = scorer.score(&input, &weights).await.unwrap();
        assert_eq!(result.weights, weights);
        assert!((result.overall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_adapt_short_content_shifts_to_structural() {
        let scorer = scorer();
        let input = AnalysisInput::new("doc", "too short").with_categories(vec!["a".into()], 0.8);
        let adapted = scorer.adapt_weights(&input, &DimensionWeights::default(), Utc::now());
        assert!((adapted.semantic - 0.175).abs() < 1e-9);
        assert!((adapted.structural - 0.375).abs() < 1e-9);
        assert!(adapted.is_normalized());
    }

    #[test]
    fn test_adapt_without_categories_zeroes_categorical() {
        let scorer = scorer();
        let input = AnalysisInput::new("doc", long_text());
        let adapted = scorer.adapt_weights(&input, &DimensionWeights::default(), Utc::now());
        assert_eq!(adapted.categorical, 0.0);
        assert!(adapted.is_normalized());
        assert!((adapted.semantic - 0.35 / 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_adapt_stale_content_boosts_temporal() {
        let scorer = scorer();
        let now = Utc::now();
        let input = AnalysisInput::new("doc", long_text())
            .with_categories(vec!["a".into()], 0.8)
            .with_temporal(TemporalMetadata::new(now - Duration::days(200)));
        let adapted = scorer.adapt_weights(&input, &DimensionWeights::default(), now);
        // temporal 0.2 * 1.5 = 0.3, total 1.1
        assert!((adapted.temporal - 0.3 / 1.1).abs() < 1e-9);
        assert!(adapted.is_normalized());
    }

    #[test]
    fn test_adapt_degenerate_weights_use_defaults() {
        let scorer = scorer();
        let input = AnalysisInput::new("doc", long_text()).with_categories(vec!["a".into()], 0.8);
        let adapted = scorer.adapt_weights(
            &input,
            &DimensionWeights::new(0.0, 0.0, 0.0, 0.0),
            Utc::now(),
        );
        let defaults = DimensionWeights::default();
        for (dimension, weight) in adapted.iter() {
            assert!((weight - defaults.get(dimension)).abs() < 1e-9);
        }
    }
}
