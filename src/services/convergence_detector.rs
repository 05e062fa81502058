//! Convergence detector service.
//!
//! Pure analysis of an entity's most recent history entries. The detector
//! keeps no state between calls: the same history always yields the same
//! [`ConvergenceState`].
//!
//! Ordered checks over the last `W` entries:
//! 1. fewer than `W` entries: `unconverged` / `insufficient_history`
//! 2. any score below the threshold: `unconverged` / `below_threshold`
//! 3. any `|delta|` above the maximum: `stable` / `settling` if the window
//!    ending one entry earlier was converged, else `unconverged` / `unstable`
//! 4. otherwise `converged` / `stable_window`

use crate::domain::models::{
    ConvergenceConfig, ConvergenceReason, ConvergenceState, ConvergenceStatus, HistoryEntry,
};

/// Absorbs float noise in deltas derived by subtraction (0.87 - 0.85).
const DELTA_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self::new(ConvergenceConfig::default())
    }
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        let config = ConvergenceConfig {
            stability_window: config.stability_window.max(1),
            ..config
        };
        Self { config }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn window(&self) -> usize {
        self.config.stability_window
    }

    /// Analyze `history` (oldest first).
    pub fn analyze(&self, history: &[HistoryEntry]) -> ConvergenceState {
        let w = self.window();
        let observed = history.len();
        if observed < w {
            return ConvergenceState::unconverged(ConvergenceReason::InsufficientHistory, observed);
        }

        let window = &history[observed - w..];
        match self.check_window(window) {
            Some(reason) if reason != ConvergenceReason::Unstable => {
                ConvergenceState::unconverged(reason, observed)
            }
            Some(_) => {
                let previous = history.get(observed.saturating_sub(w + 1)..observed - 1);
                let settling = observed > w
                    && previous.is_some_and(|prev| self.check_window(prev).is_none());
                if settling {
                    self.qualified(
                        ConvergenceStatus::Stable,
                        ConvergenceReason::Settling,
                        window,
                        observed,
                    )
                } else {
                    ConvergenceState::unconverged(ConvergenceReason::Unstable, observed)
                }
            }
            None => self.qualified(
                ConvergenceStatus::Converged,
                ConvergenceReason::StableWindow,
                window,
                observed,
            ),
        }
    }

    /// `None` when the window passes both checks.
    fn check_window(&self, window: &[HistoryEntry]) -> Option<ConvergenceReason> {
        if window.iter().any(|e| e.overall() < self.config.threshold) {
            return Some(ConvergenceReason::BelowThreshold);
        }
        if window
            .iter()
            .any(|e| e.delta.abs() > self.config.max_delta + DELTA_EPSILON)
        {
            return Some(ConvergenceReason::Unstable);
        }
        None
    }

    fn qualified(
        &self,
        status: ConvergenceStatus,
        reason: ConvergenceReason,
        window: &[HistoryEntry],
        observed: usize,
    ) -> ConvergenceState {
        let scores: Vec<f64> = window.iter().map(HistoryEntry::overall).collect();
        ConvergenceState {
            status,
            reason,
            iterations_observed: observed,
            confidence_of_convergence: (1.0 - 10.0 * population_variance(&scores)).max(0.0),
        }
    }
}

/// Population variance; 0 for an empty slice.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::confidence::test_support::result_with;
    use crate::domain::models::ConfidenceHistory;

    fn history_of(scores: &[f64]) -> Vec<HistoryEntry> {
        let mut history = ConfidenceHistory::new("doc", 100);
        for score in scores {
            history.record(result_with("doc", *score));
        }
        history.entries()
    }

    #[test]
    fn test_insufficient_history_regardless_of_scores() {
        let detector = ConvergenceDetector::default();
        let state = detector.analyze(&history_of(&[0.99, 0.99]));
        assert_eq!(state.status, ConvergenceStatus::Unconverged);
        assert_eq!(state.reason, ConvergenceReason::InsufficientHistory);
        assert_eq!(state.iterations_observed, 2);
        assert_eq!(state.confidence_of_convergence, 0.0);
    }

    #[test]
    fn test_below_threshold() {
        let detector = ConvergenceDetector::default();
        let state = detector.analyze(&history_of(&[0.90, 0.84, 0.90]));
        assert_eq!(state.reason, ConvergenceReason::BelowThreshold);
    }

    #[test]
    fn test_worked_example_flips_on_fifth_entry() {
        let detector = ConvergenceDetector::default();

        let four = history_of(&[0.82, 0.85, 0.86, 0.86]);
        let deltas: Vec<f64> = four.iter().map(|e| (e.delta * 100.0).round() / 100.0).collect();
        assert_eq!(deltas, vec![0.0, 0.03, 0.01, 0.0]);

        let state = detector.analyze(&four);
        assert_eq!(state.status, ConvergenceStatus::Unconverged);
        assert_eq!(state.reason, ConvergenceReason::Unstable);

        let five = history_of(&[0.82, 0.85, 0.86, 0.86, 0.86]);
        let state = detector.analyze(&five);
        assert_eq!(state.status, ConvergenceStatus::Converged);
        assert_eq!(state.reason, ConvergenceReason::StableWindow);
        assert!(state.confidence_of_convergence > 0.99);
    }

    #[test]
    fn test_delta_equal_to_max_is_allowed() {
        let detector = ConvergenceDetector::default();
        let state = detector.analyze(&history_of(&[0.87, 0.87, 0.85, 0.87]));
        assert!(state.is_converged());
    }

    #[test]
    fn test_settling_after_convergence_is_stable() {
        let detector = ConvergenceDetector::default();
        let state = detector.analyze(&history_of(&[0.90, 0.90, 0.90, 0.95]));
        assert_eq!(state.status, ConvergenceStatus::Stable);
        assert_eq!(state.reason, ConvergenceReason::Settling);
        assert!(state.confidence_of_convergence > 0.0);
    }

    #[test]
    fn test_dropping_below_threshold_after_convergence_is_unconverged() {
        let detector = ConvergenceDetector::default();
        let state = detector.analyze(&history_of(&[0.90, 0.90, 0.90, 0.60]));
        assert_eq!(state.status, ConvergenceStatus::Unconverged);
        assert_eq!(state.reason, ConvergenceReason::BelowThreshold);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let detector = ConvergenceDetector::default();
        let history = history_of(&[0.80, 0.86, 0.87, 0.87, 0.88]);
        assert_eq!(detector.analyze(&history), detector.analyze(&history));
    }

    #[test]
    fn test_confidence_of_convergence_penalizes_variance() {
        let detector = ConvergenceDetector::new(ConvergenceConfig {
            threshold: 0.5,
            stability_window: 3,
            max_delta: 0.5,
        });
        let state = detector.analyze(&history_of(&[0.6, 0.9, 0.6]));
        assert!(state.is_converged());
        // variance = 0.02 -> 1 - 0.2
        assert!((state.confidence_of_convergence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_zero_window_is_treated_as_one() {
        let detector = ConvergenceDetector::new(ConvergenceConfig {
            stability_window: 0,
            ..ConvergenceConfig::default()
        });
        assert_eq!(detector.window(), 1);
        assert!(detector.analyze(&history_of(&[0.9])).is_converged());
    }

    #[test]
    fn test_population_variance() {
        assert_eq!(population_variance(&[]), 0.0);
        assert_eq!(population_variance(&[0.5, 0.5]), 0.0);
        assert!((population_variance(&[0.0, 1.0]) - 0.25).abs() < 1e-12);
    }
}
