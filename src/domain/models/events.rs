//! Typed events emitted to external collectors (dashboards, alerting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::job::JobId;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    ConvergenceReached {
        entity_id: String,
        iteration: u64,
        confidence_of_convergence: f64,
    },
    DivergenceAlert {
        rolling_mean: f64,
        threshold: f64,
        window: usize,
    },
    ShadowDisabled {
        rolling_mean: f64,
        consecutive_windows: u32,
    },
    ShadowEnabled,
    JobCompleted {
        job_id: JobId,
        entity_id: String,
        overall: f64,
    },
    JobFailed {
        job_id: JobId,
        entity_id: String,
        error: String,
    },
    JobCancelled {
        job_id: JobId,
        entity_id: String,
    },
    WorkerPoolResized {
        workers: usize,
    },
}

impl EventPayload {
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::ConvergenceReached { .. } | Self::ShadowEnabled | Self::JobCompleted { .. } => {
                EventSeverity::Info
            }
            Self::DivergenceAlert { .. } | Self::JobCancelled { .. } => EventSeverity::Warning,
            Self::JobFailed { .. } => EventSeverity::Error,
            Self::ShadowDisabled { .. } => EventSeverity::Critical,
            Self::WorkerPoolResized { .. } => EventSeverity::Debug,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConvergenceReached { .. } => "convergence_reached",
            Self::DivergenceAlert { .. } => "divergence_alert",
            Self::ShadowDisabled { .. } => "shadow_disabled",
            Self::ShadowEnabled => "shadow_enabled",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::WorkerPoolResized { .. } => "worker_pool_resized",
        }
    }
}

/// Event envelope delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub payload: EventPayload,
}

impl From<EventPayload> for EngineEvent {
    fn from(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber(0),
            timestamp: Utc::now(),
            severity: payload.severity(),
            payload,
        }
    }
}
