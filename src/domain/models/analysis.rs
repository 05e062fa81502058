//! Analysis input handed to the scorer by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Structural features detected by whatever parsed the source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFlags {
    #[serde(default)]
    pub has_title: bool,
    #[serde(default)]
    pub has_sections: bool,
    #[serde(default)]
    pub has_lists: bool,
    #[serde(default)]
    pub has_code: bool,
}

/// Creation/modification timestamps and prior analysis count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// How many times this entity has been analyzed before.
    #[serde(default)]
    pub prior_iterations: u32,
}

impl TemporalMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            modified_at: None,
            prior_iterations: 0,
        }
    }

    /// The timestamp age is measured from: last modification, else creation.
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.modified_at.unwrap_or(self.created_at)
    }

    /// Age in fractional days at `now`. Future timestamps count as zero.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.last_touched()).num_seconds().max(0);
        seconds as f64 / 86_400.0
    }
}

impl Default for TemporalMetadata {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Immutable value scored by the [`Scorer`](crate::services::Scorer).
///
/// Owned by the caller; scoring never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub entity_id: String,
    #[serde(default)]
    pub content: String,
    /// Precomputed embedding. When absent the semantic scorer asks the
    /// configured embedding provider.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Confidence of the category assignment, in `[0,1]`.
    #[serde(default)]
    pub category_confidence: f64,
    #[serde(default)]
    pub structure: StructuralFlags,
    #[serde(default)]
    pub temporal: TemporalMetadata,
}

impl AnalysisInput {
    pub fn new(entity_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            content: content.into(),
            embedding: None,
            categories: Vec::new(),
            category_confidence: 0.0,
            structure: StructuralFlags::default(),
            temporal: TemporalMetadata::default(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>, confidence: f64) -> Self {
        self.categories = categories;
        self.category_confidence = confidence;
        self
    }

    pub fn with_structure(mut self, structure: StructuralFlags) -> Self {
        self.structure = structure;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalMetadata) -> Self {
        self.temporal = temporal;
        self
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn has_categories(&self) -> bool {
        self.categories.iter().any(|c| !c.trim().is_empty())
    }

    /// Reject inputs that would make any score meaningless.
    ///
    /// A malformed embedding is deliberately not checked here: the semantic
    /// scorer degrades to the neutral score instead of failing the job.
    pub fn validate(&self) -> DomainResult<()> {
        if self.entity_id.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "entity_id cannot be empty".to_string(),
            ));
        }

        if !self.category_confidence.is_finite()
            || !(0.0..=1.0).contains(&self.category_confidence)
        {
            return Err(DomainError::InvalidInput(format!(
                "category_confidence must be within [0,1], got {}",
                self.category_confidence
            )));
        }

        if let Some(modified) = self.temporal.modified_at {
            if modified < self.temporal.created_at {
                return Err(DomainError::InvalidInput(format!(
                    "modified_at {} precedes created_at {}",
                    modified, self.temporal.created_at
                )));
            }
        }

        Ok(())
    }
}
