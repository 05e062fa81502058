//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - DimensionScorer: pluggable per-dimension scoring functions
//! - EmbeddingProvider: vectors for the semantic dimension
//! - HistoryStore: durable per-entity confidence history
//!
//! These traits keep the engine independent of specific infrastructure.

pub mod dimension_scorer;
pub mod embedding;
pub mod history_store;
pub mod memory_history;
pub mod null_embedding;

pub use dimension_scorer::{DimensionScorer, ScoringContext};
pub use embedding::EmbeddingProvider;
pub use history_store::HistoryStore;
pub use memory_history::InMemoryHistoryStore;
pub use null_embedding::NullEmbeddingProvider;
