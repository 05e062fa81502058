//! Built-in deterministic sub-scorers, one per dimension.
//!
//! These are simple reproducible heuristics. Each returns a value in `[0,1]`
//! or an error that the scorer replaces with the neutral score.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AnalysisInput, Dimension, NEUTRAL_SCORE};
use crate::domain::ports::{DimensionScorer, EmbeddingProvider, ScoringContext};

/// Word count at which the length signal reaches ~63%.
const LENGTH_SATURATION_WORDS: f64 = 50.0;

/// Embedding plus lexical diversity of the content.
pub struct SemanticScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl SemanticScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Type/token ratio blended with a saturating length signal.
    fn lexical_signal(content: &str) -> f64 {
        let tokens: Vec<String> = content
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return 0.0;
        }
        let total = tokens.len() as f64;
        let unique = tokens.iter().collect::<HashSet<_>>().len() as f64;
        let type_token_ratio = unique / total;
        let length = 1.0 - (-total / LENGTH_SATURATION_WORDS).exp();
        0.5 * type_token_ratio + 0.5 * length
    }

    /// Norm closeness to 1, scaled by the share of non-zero components.
    fn embedding_signal(embedding: &[f32]) -> f64 {
        let norm = embedding
            .iter()
            .map(|v| f64::from(*v).powi(2))
            .sum::<f64>()
            .sqrt();
        let closeness = 1.0 / (1.0 + (norm - 1.0).abs());
        let non_zero = embedding.iter().filter(|v| **v != 0.0).count() as f64;
        closeness * (non_zero / embedding.len() as f64)
    }
}

#[async_trait]
impl DimensionScorer for SemanticScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Semantic
    }

    async fn score(&self, input: &AnalysisInput, _ctx: &ScoringContext) -> DomainResult<f64> {
        let embedding = match &input.embedding {
            Some(embedding) => embedding.clone(),
            None => self.provider.embed(&input.content).await?,
        };

        if embedding.is_empty() {
            return Err(DomainError::scoring(
                Dimension::Semantic,
                format!("no embedding vector available from {}", self.provider.name()),
            ));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::scoring(
                Dimension::Semantic,
                "malformed embedding: non-finite component",
            ));
        }

        Ok(0.5 * Self::lexical_signal(&input.content) + 0.5 * Self::embedding_signal(&embedding))
    }
}

/// Classifier confidence, discounted as the category set grows.
#[derive(Debug, Clone, Default)]
pub struct CategoricalScorer;

#[async_trait]
impl DimensionScorer for CategoricalScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Categorical
    }

    async fn score(&self, input: &AnalysisInput, _ctx: &ScoringContext) -> DomainResult<f64> {
        let n = input
            .categories
            .iter()
            .filter(|c| !c.trim().is_empty())
            .count();
        if n == 0 {
            return Ok(NEUTRAL_SCORE);
        }
        Ok(input.category_confidence / (1.0 + 0.1 * (n - 1) as f64))
    }
}

/// Presence of document structure markers.
#[derive(Debug, Clone, Default)]
pub struct StructuralScorer;

#[async_trait]
impl DimensionScorer for StructuralScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Structural
    }

    async fn score(&self, input: &AnalysisInput, _ctx: &ScoringContext) -> DomainResult<f64> {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        let s = &input.structure;
        let coverage = 0.3 * flag(s.has_title)
            + 0.3 * flag(s.has_sections)
            + 0.2 * flag(s.has_lists)
            + 0.2 * flag(s.has_code);
        Ok(0.2 + 0.8 * coverage)
    }
}

/// Freshness decay blended with how often the entity was analyzed before.
#[derive(Debug, Clone, Default)]
pub struct TemporalScorer;

#[async_trait]
impl DimensionScorer for TemporalScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Temporal
    }

    async fn score(&self, input: &AnalysisInput, ctx: &ScoringContext) -> DomainResult<f64> {
        let half_life = ctx.config.freshness_half_life_days;
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(DomainError::scoring(
                Dimension::Temporal,
                format!("invalid freshness half-life {half_life}"),
            ));
        }

        let age_days = input.temporal.age_days(ctx.now);
        let freshness = 0.5_f64.powf(age_days / half_life);
        let maturity = 1.0 - 1.0 / (1.0 + f64::from(input.temporal.prior_iterations));
        Ok(0.7 * freshness + 0.3 * maturity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ScoringConfig, StructuralFlags, TemporalMetadata};
    use crate::domain::ports::NullEmbeddingProvider;
    use chrono::{Duration, Utc};

    fn ctx() -> ScoringContext {
        ScoringContext::new(Utc::now(), ScoringConfig::default())
    }

    #[tokio::test]
    async fn test_semantic_requires_vector() {
        let scorer = SemanticScorer::new(Arc::new(NullEmbeddingProvider::new()));
        let input = AnalysisInput::new("doc", "plain text");
        let err = scorer.score(&input, &ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::DimensionScoring {
                dimension: Dimension::Semantic,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_semantic_rejects_non_finite_embedding() {
        let scorer = SemanticScorer::new(Arc::new(NullEmbeddingProvider::new()));
        let input = AnalysisInput::new("doc", "text").with_embedding(vec![0.5, f32::NAN]);
        assert!(scorer.score(&input, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn test_semantic_unit_vector_scores_high() {
        let scorer = SemanticScorer::new(Arc::new(NullEmbeddingProvider::new()));
        let content = (0..80).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let input = AnalysisInput::new("doc", content).with_embedding(vec![0.6, 0.8]);
        let score = scorer.score(&input, &ctx()).await.unwrap();
        assert!(score > 0.85 && score <= 1.0, "score was {score}");
    }

    #[tokio::test]
    async fn test_categorical_discounts_many_categories() {
        let scorer = CategoricalScorer;
        let none = AnalysisInput::new("doc", "text");
        assert_eq!(scorer.score(&none, &ctx()).await.unwrap(), NEUTRAL_SCORE);

        let one = AnalysisInput::new("doc", "text").with_categories(vec!["a".into()], 0.9);
        assert!((scorer.score(&one, &ctx()).await.unwrap() - 0.9).abs() < 1e-12);

        let three = AnalysisInput::new("doc", "text")
            .with_categories(vec!["a".into(), "b".into(), "c".into()], 0.9);
        assert!((scorer.score(&three, &ctx()).await.unwrap() - 0.75).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_structural_bounds() {
        let scorer = StructuralScorer;
        let bare = AnalysisInput::new("doc", "text");
        assert!((scorer.score(&bare, &ctx()).await.unwrap() - 0.2).abs() < 1e-12);

        let full = AnalysisInput::new("doc", "text").with_structure(StructuralFlags {
            has_title: true,
            has_sections: true,
            has_lists: true,
            has_code: true,
        });
        assert!((scorer.score(&full, &ctx()).await.unwrap() - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_temporal_decays_with_age() {
        let scorer = TemporalScorer;
        let ctx = ctx();

        let fresh = AnalysisInput::new("doc", "text").with_temporal(TemporalMetadata::new(ctx.now));
        assert!((scorer.score(&fresh, &ctx).await.unwrap() - 0.7).abs() < 1e-9);

        let half_life_old = AnalysisInput::new("doc", "text")
            .with_temporal(TemporalMetadata::new(ctx.now - Duration::days(180)));
        assert!((scorer.score(&half_life_old, &ctx).await.unwrap() - 0.35).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_temporal_future_timestamp_counts_as_fresh() {
        let scorer = TemporalScorer;
        let ctx = ctx();
        let mut temporal = TemporalMetadata::new(ctx.now + Duration::days(3));
        temporal.prior_iterations = 1;
        let input = AnalysisInput::new("doc", "text").with_temporal(temporal);
        assert!((scorer.score(&input, &ctx).await.unwrap() - 0.85).abs() < 1e-9);
    }
}
