//! Convergence state derived from an entity's recent history.
//!
//! The state is never stored on its own; it is recomputed from the last
//! `W` history entries every time a new result is recorded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an entity sits in the convergence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// Initial/default state.
    Unconverged,
    /// Scores remain above threshold but deltas are still settling after
    /// having converged.
    Stable,
    /// Terminal for the current tracking epoch.
    Converged,
}

impl ConvergenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconverged => "unconverged",
            Self::Stable => "stable",
            Self::Converged => "converged",
        }
    }
}

impl Default for ConvergenceStatus {
    fn default() -> Self {
        Self::Unconverged
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// Fewer than `W` entries recorded.
    InsufficientHistory,
    /// Some score in the window is below the convergence threshold.
    BelowThreshold,
    /// Some delta in the window exceeds the maximum allowed delta.
    Unstable,
    /// Previously converged; above threshold but deltas exceed the maximum.
    Settling,
    /// Every score above threshold and every delta within bounds.
    StableWindow,
}

impl ConvergenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientHistory => "insufficient_history",
            Self::BelowThreshold => "below_threshold",
            Self::Unstable => "unstable",
            Self::Settling => "settling",
            Self::StableWindow => "stable_window",
        }
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub status: ConvergenceStatus,
    pub reason: ConvergenceReason,
    /// Number of history entries the analysis saw.
    pub iterations_observed: usize,
    /// Continuous quality signal in `[0,1]`; zero unless converged or stable.
    pub confidence_of_convergence: f64,
}

impl ConvergenceState {
    pub fn unconverged(reason: ConvergenceReason, iterations_observed: usize) -> Self {
        Self {
            status: ConvergenceStatus::Unconverged,
            reason,
            iterations_observed,
            confidence_of_convergence: 0.0,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self::unconverged(ConvergenceReason::InsufficientHistory, 0)
    }
}
