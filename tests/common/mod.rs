//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use cadence::domain::models::{
    AnalysisInput, AnalysisRequest, Config, StructuralFlags, TemporalMetadata,
};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let db_path = dir.path().join("history.db");
    (dir, db_path)
}

/// Setup test logging
///
/// Initializes a tracing subscriber writing to the test harness.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `predicate` every 10ms until it holds or `timeout_ms` elapses.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

/// Small pool with generous timeouts, suitable for most integration tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.min_workers = 2;
    config.orchestrator.max_workers = 4;
    config.scoring.per_call_timeout_ms = 5_000;
    config
}

/// A well-formed document that scores high on every dimension.
pub fn rich_input(entity_id: &str) -> AnalysisInput {
    let content = (0..120)
        .map(|i| format!("term{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    AnalysisInput::new(entity_id, content)
        .with_embedding(vec![0.5; 4])
        .with_categories(vec!["engineering".to_string()], 0.95)
        .with_structure(StructuralFlags {
            has_title: true,
            has_sections: true,
            has_lists: true,
            has_code: true,
        })
        .with_temporal(TemporalMetadata {
            created_at: created,
            modified_at: Some(Utc::now()),
            prior_iterations: 40,
        })
}

pub fn request(entity_id: &str) -> AnalysisRequest {
    AnalysisRequest::new(rich_input(entity_id))
}
