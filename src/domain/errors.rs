//! Domain errors for the Cadence scoring engine.

use thiserror::Error;

use super::models::{Dimension, JobId, JobStatus};

/// Domain-level errors that can occur in the Cadence engine.
///
/// Only `InvalidInput`, `QueueFull`, `ShuttingDown` and `Persistence` are
/// expected to reach callers. `DimensionScoring` and `Timeout` are recovered
/// inside the scorer with a neutral fallback unless they repeat.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Dimension {dimension} scoring failed: {reason}")]
    DimensionScoring { dimension: Dimension, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Queue full: depth {depth} reached maximum {max_depth}")]
    QueueFull { depth: usize, max_depth: usize },

    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("Job panicked: {0}")]
    JobPanicked(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether the error only degrades quality and can be absorbed locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DimensionScoring { .. } | Self::Timeout { .. })
    }

    pub(crate) fn scoring(dimension: Dimension, reason: impl Into<String>) -> Self {
        Self::DimensionScoring {
            dimension,
            reason: reason.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(DomainError::scoring(Dimension::Semantic, "bad vector").is_recoverable());
        assert!(DomainError::Timeout {
            operation: "embed".to_string(),
            timeout_ms: 10
        }
        .is_recoverable());
        assert!(!DomainError::InvalidInput("empty id".to_string()).is_recoverable());
        assert!(!DomainError::QueueFull {
            depth: 5,
            max_depth: 5
        }
        .is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = DomainError::QueueFull {
            depth: 1000,
            max_depth: 1000,
        };
        assert_eq!(err.to_string(), "Queue full: depth 1000 reached maximum 1000");

        let err = DomainError::scoring(Dimension::Temporal, "clock skew");
        assert_eq!(err.to_string(), "Dimension temporal scoring failed: clock skew");
    }
}
