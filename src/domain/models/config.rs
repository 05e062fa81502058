use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::weights::DimensionWeights;

/// Main configuration structure for Cadence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Scorer and sub-scorer configuration
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Weight optimizer configuration
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Convergence detection configuration
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// History tracking configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Shadow-mode comparison configuration
    #[serde(default)]
    pub shadow: ShadowConfig,

    /// Job queue and worker pool configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// History persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    /// Initial dimension weights
    #[serde(default)]
    pub default_weights: DimensionWeights,

    /// Content with fewer words than this is considered short
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Fraction of the semantic weight moved to structural for short content
    #[serde(default = "default_short_content_shift")]
    pub short_content_shift: f64,

    /// Content older than this many days is considered stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: f64,

    /// Multiplier applied to the temporal weight for stale content
    #[serde(default = "default_stale_temporal_boost")]
    pub stale_temporal_boost: f64,

    /// Half-life of the temporal freshness signal, in days
    #[serde(default = "default_freshness_half_life_days")]
    pub freshness_half_life_days: f64,

    /// Timeout for each sub-scorer call, in milliseconds
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,

    /// Consecutive timeouts of one dimension before jobs start failing
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,

    /// Time-to-live of cached results, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Entities kept in the result cache before the oldest are evicted
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

const fn default_min_word_count() -> usize {
    50
}

const fn default_short_content_shift() -> f64 {
    0.5
}

const fn default_stale_after_days() -> f64 {
    90.0
}

const fn default_stale_temporal_boost() -> f64 {
    1.5
}

const fn default_freshness_half_life_days() -> f64 {
    180.0
}

const fn default_per_call_timeout_ms() -> u64 {
    3000
}

const fn default_max_consecutive_timeouts() -> u32 {
    5
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_cache_capacity() -> usize {
    10_000
}

impl ScoringConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_weights: DimensionWeights::default(),
            min_word_count: default_min_word_count(),
            short_content_shift: default_short_content_shift(),
            stale_after_days: default_stale_after_days(),
            stale_temporal_boost: default_stale_temporal_boost(),
            freshness_half_life_days: default_freshness_half_life_days(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Weight optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizerConfig {
    /// Step size applied to each gradient
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Lower clamp for each weight before renormalization
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,

    /// Upper clamp for each weight before renormalization
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

const fn default_learning_rate() -> f64 {
    0.01
}

const fn default_min_weight() -> f64 {
    0.05
}

const fn default_max_weight() -> f64 {
    0.8
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
        }
    }
}

/// Convergence detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvergenceConfig {
    /// Minimum overall score for every entry in the window
    #[serde(default = "default_convergence_threshold")]
    pub threshold: f64,

    /// Number of most recent entries examined (W)
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,

    /// Largest allowed |delta| within the window
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
}

const fn default_convergence_threshold() -> f64 {
    0.85
}

const fn default_stability_window() -> usize {
    3
}

const fn default_max_delta() -> f64 {
    0.02
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold: default_convergence_threshold(),
            stability_window: default_stability_window(),
            max_delta: default_max_delta(),
        }
    }
}

/// History tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Maximum entries retained per entity
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Latest score below this triggers reanalysis
    #[serde(default = "default_target_confidence")]
    pub target_confidence: f64,

    /// Score variance above this (while unconverged) triggers reanalysis
    #[serde(default = "default_reanalysis_variance_threshold")]
    pub reanalysis_variance_threshold: f64,

    /// Save history to the store after every recorded result
    #[serde(default = "default_true")]
    pub write_through: bool,
}

const fn default_history_capacity() -> usize {
    100
}

const fn default_target_confidence() -> f64 {
    0.85
}

const fn default_reanalysis_variance_threshold() -> f64 {
    0.01
}

const fn default_true() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            target_confidence: default_target_confidence(),
            reanalysis_variance_threshold: default_reanalysis_variance_threshold(),
            write_through: default_true(),
        }
    }
}

/// Shadow-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShadowConfig {
    /// Whether shadow comparison starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// An entity is sampled when hash(entity_id) % divisor == 0
    #[serde(default = "default_sampling_divisor")]
    pub sampling_divisor: u64,

    /// Comparisons retained for aggregate metrics
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Comparisons per breaker evaluation window (N)
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: usize,

    /// Rolling mean divergence that raises an alert
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Rolling mean divergence that counts toward auto-disable
    #[serde(default = "default_hard_stop_threshold")]
    pub hard_stop_threshold: f64,

    /// Consecutive hard-stop windows before shadow mode is disabled (M)
    #[serde(default = "default_hard_stop_windows")]
    pub hard_stop_windows: u32,
}

const fn default_sampling_divisor() -> u64 {
    10
}

const fn default_buffer_capacity() -> usize {
    1000
}

const fn default_evaluation_window() -> usize {
    20
}

const fn default_alert_threshold() -> f64 {
    0.10
}

const fn default_hard_stop_threshold() -> f64 {
    0.15
}

const fn default_hard_stop_windows() -> u32 {
    3
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sampling_divisor: default_sampling_divisor(),
            buffer_capacity: default_buffer_capacity(),
            evaluation_window: default_evaluation_window(),
            alert_threshold: default_alert_threshold(),
            hard_stop_threshold: default_hard_stop_threshold(),
            hard_stop_windows: default_hard_stop_windows(),
        }
    }
}

/// Job queue and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Workers kept alive even when idle
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Upper bound on concurrent workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Submissions beyond this depth are rejected
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Queue depth above which another worker is spawned
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Idle time after which surplus workers exit, in milliseconds
    #[serde(default = "default_idle_grace_ms")]
    pub idle_grace_ms: u64,

    /// Buffered events per subscriber
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Finished job records kept for `status`/`wait` before the oldest are dropped
    #[serde(default = "default_job_retention")]
    pub job_retention: usize,
}

const fn default_min_workers() -> usize {
    2
}

const fn default_max_workers() -> usize {
    8
}

const fn default_max_queue_depth() -> usize {
    1000
}

const fn default_high_water_mark() -> usize {
    16
}

const fn default_idle_grace_ms() -> u64 {
    30_000
}

const fn default_event_channel_capacity() -> usize {
    1024
}

const fn default_job_retention() -> usize {
    10_000
}

impl OrchestratorConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            max_queue_depth: default_max_queue_depth(),
            high_water_mark: default_high_water_mark(),
            idle_grace_ms: default_idle_grace_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            job_retention: default_job_retention(),
        }
    }
}

/// Where confidence histories are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

/// History persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_storage_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_database_path() -> String {
    ".cadence/history.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl StorageConfig {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}
