use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::analysis::AnalysisInput;
use super::confidence::ConfidenceResult;
use super::convergence::ConvergenceState;
use super::shadow::ShadowDecision;
use crate::domain::errors::{DomainError, DomainResult};

/// Identifier assigned to a submitted analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle: `queued -> running -> {completed | failed | cancelled}`.
///
/// A queued job may also be cancelled directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<JobStatus> {
        match self {
            Self::Queued => vec![Self::Running, Self::Cancelled],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub input: AnalysisInput,
    /// Higher is more urgent.
    #[serde(default)]
    pub priority: i32,
    /// Score from the baseline analysis system, for shadow comparison.
    #[serde(default)]
    pub baseline_score: Option<f64>,
}

impl AnalysisRequest {
    pub fn new(input: AnalysisInput) -> Self {
        Self {
            input,
            priority: 0,
            baseline_score: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_baseline(mut self, baseline_score: f64) -> Self {
        self.baseline_score = Some(baseline_score);
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.input.entity_id
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.input.validate()?;
        if let Some(baseline) = self.baseline_score {
            if !baseline.is_finite() || !(0.0..=1.0).contains(&baseline) {
                return Err(DomainError::InvalidInput(format!(
                    "baseline_score must be within [0,1], got {baseline}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything a completed job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub confidence: ConfidenceResult,
    pub convergence: ConvergenceState,
    /// Absent when no baseline score was supplied.
    pub shadow: Option<ShadowDecision>,
}

/// Orchestrator-side view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub entity_id: String,
    pub priority: i32,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: JobId, request: &AnalysisRequest) -> Self {
        Self {
            id,
            entity_id: request.entity_id().to_string(),
            priority: request.priority,
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Transition to `new_status`, stamping start/finish times.
    pub fn transition_to(&mut self, new_status: JobStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        if new_status == JobStatus::Running {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = new_status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(AnalysisInput::new("doc-1", "some content"))
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Completed.valid_transitions().is_empty());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_record_transition_stamps_times() {
        let mut record = JobRecord::new(JobId::new(), &request());
        record.transition_to(JobStatus::Running).unwrap();
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_none());

        record.transition_to(JobStatus::Completed).unwrap();
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_record_rejects_invalid_transition() {
        let mut record = JobRecord::new(JobId::new(), &request());
        let err = record.transition_to(JobStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStateTransition {
                from: JobStatus::Queued,
                to: JobStatus::Completed
            }
        ));
        assert_eq!(record.status, JobStatus::Queued);
    }

    #[test]
    fn test_request_validates_baseline() {
        assert!(request().with_baseline(0.7).validate().is_ok());
        assert!(request().with_baseline(1.2).validate().is_err());
        assert!(request().with_baseline(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{"input":{"entity_id":"doc","temporal":{"created_at":"2024-03-01T00:00:00Z"}}}"#;
        let req: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.priority, 0);
        assert!(req.baseline_score.is_none());
    }
}
