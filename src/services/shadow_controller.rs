//! Shadow-mode comparison with a divergence circuit breaker.
//!
//! A deterministic hash of the entity id decides whether an entity is
//! sampled. Sampled results are compared with the baseline score and kept in
//! a bounded ring buffer. Every `evaluation_window` comparisons the breaker
//! looks at the mean divergence of the most recent window:
//!
//! - above `alert_threshold`: a `divergence_alert` event is emitted
//! - above `hard_stop_threshold` for `hard_stop_windows` consecutive windows:
//!   the breaker opens and shadow mode stays off until [`ShadowController::enable`]
//!
//! Shadow evaluation never touches the primary result.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::models::{
    BreakerState, ConfidenceResult, DivergenceBuckets, EventPayload, ShadowComparison,
    ShadowConfig, ShadowDecision, ShadowMetrics,
};
use crate::services::event_bus::EventBus;

/// Stable 64-bit sampling hash: first 8 bytes of BLAKE3(entity_id), little-endian.
pub fn sampling_hash(entity_id: &str) -> u64 {
    let digest = blake3::hash(entity_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Whether `entity_id` falls in the sample for `divisor` (0 is treated as 1).
pub fn is_sampled(entity_id: &str, divisor: u64) -> bool {
    sampling_hash(entity_id) % divisor.max(1) == 0
}

#[derive(Debug)]
struct BreakerWindow {
    breaker: BreakerState,
    buffer: VecDeque<ShadowComparison>,
    total_sampled: u64,
    since_evaluation: usize,
    consecutive_hard_stop_windows: u32,
    alerts_raised: u64,
    times_disabled: u64,
}

impl BreakerWindow {
    fn rolling_mean(&self, window: usize) -> f64 {
        let n = window.min(self.buffer.len());
        if n == 0 {
            return 0.0;
        }
        self.buffer.iter().rev().take(n).map(|c| c.divergence).sum::<f64>() / n as f64
    }
}

pub struct ShadowController {
    config: ShadowConfig,
    state: Mutex<BreakerWindow>,
    total_skipped: AtomicU64,
    events: Arc<EventBus>,
}

impl ShadowController {
    pub fn new(config: ShadowConfig, events: Arc<EventBus>) -> Self {
        let breaker = if config.enabled {
            BreakerState::Closed
        } else {
            BreakerState::Open
        };
        Self {
            state: Mutex::new(BreakerWindow {
                breaker,
                buffer: VecDeque::with_capacity(config.buffer_capacity.min(4096)),
                total_sampled: 0,
                since_evaluation: 0,
                consecutive_hard_stop_windows: 0,
                alerts_raised: 0,
                times_disabled: 0,
            }),
            config,
            total_skipped: AtomicU64::new(0),
            events,
        }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Compare `ml_result` with `baseline_score` if the entity is sampled and
    /// shadow mode is on; otherwise return immediately with `sampled=false`.
    pub fn maybe_compare(
        &self,
        entity_id: &str,
        ml_result: &ConfidenceResult,
        baseline_score: f64,
    ) -> ShadowDecision {
        if !is_sampled(entity_id, self.config.sampling_divisor) {
            self.total_skipped.fetch_add(1, Ordering::Relaxed);
            return ShadowDecision::skipped();
        }

        if !baseline_score.is_finite() {
            tracing::warn!(entity_id, baseline_score, "Ignoring non-finite baseline score");
            self.total_skipped.fetch_add(1, Ordering::Relaxed);
            return ShadowDecision::skipped();
        }

        let mut state = self.lock();
        if state.breaker == BreakerState::Open {
            drop(state);
            self.total_skipped.fetch_add(1, Ordering::Relaxed);
            return ShadowDecision::skipped();
        }

        let comparison = ShadowComparison::new(entity_id, ml_result.overall, baseline_score);
        tracing::debug!(
            entity_id,
            ml_score = comparison.ml_score,
            baseline_score = comparison.baseline_score,
            divergence = comparison.divergence,
            "Recorded shadow comparison"
        );

        let capacity = self.config.buffer_capacity.max(1);
        if state.buffer.len() >= capacity {
            state.buffer.pop_front();
        }
        state.buffer.push_back(comparison.clone());
        state.total_sampled += 1;
        state.since_evaluation += 1;

        let window = self.config.evaluation_window.max(1);
        if state.since_evaluation >= window {
            state.since_evaluation = 0;
            self.evaluate(&mut state, window);
        }

        ShadowDecision::compared(comparison)
    }

    fn evaluate(&self, state: &mut BreakerWindow, window: usize) {
        let rolling_mean = state.rolling_mean(window);

        if rolling_mean > self.config.alert_threshold {
            state.alerts_raised += 1;
            tracing::warn!(
                rolling_mean,
                threshold = self.config.alert_threshold,
                window,
                "Shadow divergence above alert threshold"
            );
            self.events.publish(EventPayload::DivergenceAlert {
                rolling_mean,
                threshold: self.config.alert_threshold,
                window,
            });
        }

        if rolling_mean > self.config.hard_stop_threshold {
            state.consecutive_hard_stop_windows += 1;
        } else {
            state.consecutive_hard_stop_windows = 0;
        }

        if state.consecutive_hard_stop_windows >= self.config.hard_stop_windows.max(1) {
            state.breaker = BreakerState::Open;
            state.times_disabled += 1;
            tracing::error!(
                rolling_mean,
                consecutive_windows = state.consecutive_hard_stop_windows,
                "Shadow mode disabled after sustained divergence"
            );
            self.events.publish(EventPayload::ShadowDisabled {
                rolling_mean,
                consecutive_windows: state.consecutive_hard_stop_windows,
            });
        }
    }

    /// Close the breaker and reset the window counters.
    pub fn enable(&self) {
        let mut state = self.lock();
        state.breaker = BreakerState::Closed;
        state.consecutive_hard_stop_windows = 0;
        state.since_evaluation = 0;
        tracing::info!("Shadow mode enabled");
        self.events.publish(EventPayload::ShadowEnabled);
    }

    /// Open the breaker manually.
    pub fn disable(&self) {
        let mut state = self.lock();
        if state.breaker == BreakerState::Open {
            return;
        }
        state.breaker = BreakerState::Open;
        state.times_disabled += 1;
        let rolling_mean = state.rolling_mean(self.config.evaluation_window.max(1));
        tracing::info!(rolling_mean, "Shadow mode disabled manually");
        self.events.publish(EventPayload::ShadowDisabled {
            rolling_mean,
            consecutive_windows: state.consecutive_hard_stop_windows,
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().breaker == BreakerState::Closed
    }

    pub fn metrics(&self) -> ShadowMetrics {
        let state = self.lock();
        let retained = state.buffer.len();
        let mut buckets = DivergenceBuckets::default();
        let mut divergence_sum = 0.0;
        for comparison in &state.buffer {
            buckets.add(comparison);
            divergence_sum += comparison.divergence;
        }
        let mean_divergence = if retained == 0 {
            0.0
        } else {
            divergence_sum / retained as f64
        };

        ShadowMetrics {
            breaker: state.breaker,
            total_sampled: state.total_sampled,
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
            retained,
            mean_divergence,
            mean_agreement: if retained == 0 {
                0.0
            } else {
                1.0 - mean_divergence
            },
            buckets,
            alerts_raised: state.alerts_raised,
            times_disabled: state.times_disabled,
            consecutive_hard_stop_windows: state.consecutive_hard_stop_windows,
        }
    }

    /// The most recent `n` comparisons, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ShadowComparison> {
        let state = self.lock();
        let skip = state.buffer.len().saturating_sub(n);
        state.buffer.iter().skip(skip).cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BreakerWindow> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
