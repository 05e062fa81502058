//! Null embedding provider implementation.
//!
//! Used when no embedding service is wired in but the semantic scorer
//! still needs an EmbeddingProvider.

use async_trait::async_trait;

use super::embedding::EmbeddingProvider;
use crate::domain::errors::DomainResult;

/// A no-op embedding provider that returns empty vectors.
#[derive(Debug, Clone, Default)]
pub struct NullEmbeddingProvider;

impl NullEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn dimension(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
        Ok(Vec::new())
    }
}
