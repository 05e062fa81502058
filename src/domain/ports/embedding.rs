//! Embedding provider port for semantic vector generation.
//!
//! Defines the trait for embedding providers that convert text into
//! dense vector representations. Producing embeddings is outside the
//! engine; the semantic scorer only consumes them.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Trait for embedding providers.
///
/// An empty vector means "no vector available" and makes the semantic
/// dimension fall back to the neutral score.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "openai", "fixed", "null").
    fn name(&self) -> &'static str;

    /// Embedding dimension for this provider/model (0 when unknown).
    fn dimension(&self) -> usize;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>>;
}
