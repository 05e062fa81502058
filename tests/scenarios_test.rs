//! Worked scenarios: convergence example and the shadow breaker.

use std::sync::Arc;

use cadence::domain::models::{
    BreakerState, ConfidenceResult, ConvergenceConfig, ConvergenceReason, ConvergenceStatus,
    DimensionScores, DimensionWeights, EventPayload, ShadowConfig, TrackerConfig,
};
use cadence::domain::ports::InMemoryHistoryStore;
use cadence::services::{ConvergenceDetector, EventBus, ShadowController, Tracker};
use chrono::Utc;

fn result(entity_id: &str, overall: f64) -> ConfidenceResult {
    ConfidenceResult {
        entity_id: entity_id.to_string(),
        dimensions: DimensionScores::neutral(),
        overall,
        weights: DimensionWeights::default(),
        weights_version: 0,
        iteration: 0,
        created_at: Utc::now(),
        fallbacks: Vec::new(),
    }
}

#[tokio::test]
async fn test_worked_convergence_example() {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let tracker = Tracker::new(
        TrackerConfig::default(),
        ConvergenceDetector::new(ConvergenceConfig::default()),
        Arc::new(InMemoryHistoryStore::new()),
        Arc::clone(&events),
    );

    // Seed so the first listed entry carries a 0.10 delta.
    tracker.track("doc", result("doc", 0.72)).await.unwrap();

    let mut states = Vec::new();
    for score in [0.82, 0.85, 0.86, 0.86] {
        states.push(tracker.track("doc", result("doc", score)).await.unwrap());
    }
    let last = states.last().unwrap();
    assert_eq!(last.status, ConvergenceStatus::Unconverged);
    assert_eq!(last.reason, ConvergenceReason::Unstable);
    assert!(rx.try_recv().is_err());

    let state = tracker.track("doc", result("doc", 0.87)).await.unwrap();
    assert_eq!(state.status, ConvergenceStatus::Converged);
    assert_eq!(state.reason, ConvergenceReason::StableWindow);
    assert!(state.confidence_of_convergence > 0.99);

    let event = rx.try_recv().unwrap();
    assert!(matches!(
        event.payload,
        EventPayload::ConvergenceReached { iteration: 6, .. }
    ));
}

#[tokio::test]
async fn test_breaker_opens_after_sustained_divergence_and_reenables() {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let shadow = ShadowController::new(
        ShadowConfig {
            sampling_divisor: 1,
            evaluation_window: 2,
            hard_stop_windows: 2,
            ..ShadowConfig::default()
        },
        Arc::clone(&events),
    );

    let ml = result("doc", 0.9);
    for _ in 0..4 {
        let decision = shadow.maybe_compare("doc", &ml, 0.5);
        assert!(decision.sampled);
    }

    let metrics = shadow.metrics();
    assert_eq!(metrics.breaker, BreakerState::Open);
    assert_eq!(metrics.alerts_raised, 2);
    assert_eq!(metrics.total_sampled, 4);

    // Breaker open: short-circuits without comparing.
    assert!(!shadow.maybe_compare("doc", &ml, 0.5).sampled);
    assert_eq!(shadow.metrics().total_skipped, 1);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.payload.name());
    }
    assert_eq!(
        names,
        vec!["divergence_alert", "divergence_alert", "shadow_disabled"]
    );

    shadow.enable();
    assert!(shadow.is_enabled());
    assert!(shadow.maybe_compare("doc", &ml, 0.88).sampled);
}

#[tokio::test]
async fn test_agreeing_scores_never_alert() {
    let shadow = ShadowController::new(
        ShadowConfig {
            sampling_divisor: 1,
            evaluation_window: 5,
            ..ShadowConfig::default()
        },
        Arc::new(EventBus::default()),
    );

    for i in 0..50 {
        let ml = result(&format!("doc-{i}"), 0.8);
        shadow.maybe_compare(&format!("doc-{i}"), &ml, 0.78);
    }
    let metrics = shadow.metrics();
    assert_eq!(metrics.breaker, BreakerState::Closed);
    assert_eq!(metrics.alerts_raised, 0);
    assert!((metrics.mean_agreement - 0.98).abs() < 1e-9);
    assert_eq!(metrics.buckets.total(), 50);
}
