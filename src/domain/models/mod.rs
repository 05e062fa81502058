pub mod analysis;
pub mod confidence;
pub mod config;
pub mod convergence;
pub mod events;
pub mod job;
pub mod queue;
pub mod shadow;
pub mod weights;

pub use analysis::{AnalysisInput, StructuralFlags, TemporalMetadata};
pub use confidence::{
    ConfidenceHistory, ConfidenceResult, DimensionFallback, DimensionScores, FallbackKind,
    HistoryEntry, DEFAULT_HISTORY_CAPACITY, NEUTRAL_SCORE,
};
pub use config::{
    Config, ConvergenceConfig, LoggingConfig, OptimizerConfig, OrchestratorConfig,
    RotationPolicy, ScoringConfig, ShadowConfig, StorageBackend, StorageConfig, TrackerConfig,
};
pub use convergence::{ConvergenceReason, ConvergenceState, ConvergenceStatus};
pub use events::{EngineEvent, EventId, EventPayload, EventSeverity, SequenceNumber};
pub use job::{AnalysisRequest, JobId, JobRecord, JobResult, JobStatus};
pub use queue::{JobQueue, QueueItem};
pub use shadow::{
    BreakerState, DivergenceBuckets, ShadowComparison, ShadowDecision, ShadowMetrics,
    DIVERGENCE_BUCKET_BOUNDS,
};
pub use weights::{Dimension, DimensionWeights, WEIGHT_SUM_TOLERANCE};
