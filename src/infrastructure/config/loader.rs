use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, StorageBackend};
use crate::domain::models::Dimension;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {field}: {value}. Must be within [0, 1]")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("Invalid convergence.stability_window: 0. Must be at least 1")]
    ZeroStabilityWindow,

    #[error("Invalid convergence.max_delta: {0}. Must be finite and non-negative")]
    InvalidMaxDelta(f64),

    #[error("Invalid shadow.sampling_divisor: 0. Must be at least 1")]
    ZeroSamplingDivisor,

    #[error("Invalid shadow thresholds: alert ({alert}) must not exceed hard stop ({hard_stop})")]
    AlertAboveHardStop { alert: f64, hard_stop: f64 },

    #[error("Invalid worker bounds: min_workers ({min}) must be in 1..=max_workers ({max})")]
    InvalidWorkerBounds { min: usize, max: usize },

    #[error("Invalid orchestrator.max_queue_depth: 0. Must be at least 1")]
    ZeroQueueDepth,

    #[error("Invalid orchestrator.job_retention: 0. Must be at least 1")]
    ZeroJobRetention,

    #[error("Invalid scoring.cache_capacity: 0. Must be at least 1")]
    ZeroCacheCapacity,

    #[error(
        "Invalid tracker.history_capacity: {capacity}. Must be at least the stability window ({window})"
    )]
    HistoryTooSmall { capacity: usize, window: usize },

    #[error("Invalid optimizer.learning_rate: {0}. Must be positive")]
    InvalidLearningRate(f64),

    #[error(
        "Invalid optimizer bounds: need 0 <= min_weight ({min}) < max_weight ({max}) <= 1"
    )]
    InvalidWeightBounds { min: f64, max: f64 },

    #[error("Invalid scoring.default_weights: {0}")]
    InvalidDefaultWeights(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty when the sqlite backend is selected")]
    EmptyDatabasePath,

    #[error("Invalid storage.max_connections: 0. Must be at least 1")]
    ZeroMaxConnections,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .cadence/config.yaml (project config)
    /// 3. .cadence/local.yaml (local overrides, optional)
    /// 4. Environment variables (CADENCE_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".cadence/config.yaml"))
            .merge(Yaml::file(".cadence/local.yaml"))
            .merge(Env::prefixed("CADENCE_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let unit = |field: &'static str, value: f64| {
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::OutOfUnitRange { field, value })
            }
        };

        // Convergence
        unit("convergence.threshold", config.convergence.threshold)?;
        if config.convergence.stability_window == 0 {
            return Err(ConfigError::ZeroStabilityWindow);
        }
        let max_delta = config.convergence.max_delta;
        if !max_delta.is_finite() || max_delta < 0.0 {
            return Err(ConfigError::InvalidMaxDelta(max_delta));
        }

        // Tracker
        unit("tracker.target_confidence", config.tracker.target_confidence)?;
        if config.tracker.history_capacity < config.convergence.stability_window {
            return Err(ConfigError::HistoryTooSmall {
                capacity: config.tracker.history_capacity,
                window: config.convergence.stability_window,
            });
        }

        // Shadow
        let shadow = &config.shadow;
        if shadow.sampling_divisor == 0 {
            return Err(ConfigError::ZeroSamplingDivisor);
        }
        unit("shadow.alert_threshold", shadow.alert_threshold)?;
        unit("shadow.hard_stop_threshold", shadow.hard_stop_threshold)?;
        if shadow.alert_threshold > shadow.hard_stop_threshold {
            return Err(ConfigError::AlertAboveHardStop {
                alert: shadow.alert_threshold,
                hard_stop: shadow.hard_stop_threshold,
            });
        }

        // Orchestrator
        let pool = &config.orchestrator;
        if pool.min_workers == 0 || pool.min_workers > pool.max_workers {
            return Err(ConfigError::InvalidWorkerBounds {
                min: pool.min_workers,
                max: pool.max_workers,
            });
        }
        if pool.max_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if pool.job_retention == 0 {
            return Err(ConfigError::ZeroJobRetention);
        }
        if config.scoring.cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }

        // Optimizer
        let optimizer = &config.optimizer;
        if !(optimizer.learning_rate.is_finite() && optimizer.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(optimizer.learning_rate));
        }
        if !(0.0 <= optimizer.min_weight
            && optimizer.min_weight < optimizer.max_weight
            && optimizer.max_weight <= 1.0)
        {
            return Err(ConfigError::InvalidWeightBounds {
                min: optimizer.min_weight,
                max: optimizer.max_weight,
            });
        }

        // Default weights
        let weights = &config.scoring.default_weights;
        for dimension in Dimension::ALL {
            let weight = weights.get(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidDefaultWeights(format!(
                    "{dimension} weight is {weight}"
                )));
            }
        }
        if weights.sum() <= 0.0 {
            return Err(ConfigError::InvalidDefaultWeights(
                "weights cannot all be zero".to_string(),
            ));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        // Storage
        if config.storage.backend == StorageBackend::Sqlite {
            if config.storage.database_path.trim().is_empty() {
                return Err(ConfigError::EmptyDatabasePath);
            }
            if config.storage.max_connections == 0 {
                return Err(ConfigError::ZeroMaxConnections);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.convergence.threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.convergence.stability_window, 3);
        assert_eq!(config.shadow.sampling_divisor, 10);
        assert_eq!(config.orchestrator.min_workers, 2);
        assert_eq!(config.storage.database_path, ".cadence/history.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
convergence:
  threshold: 0.9
  stability_window: 5
shadow:
  sampling_divisor: 20
orchestrator:
  min_workers: 1
  max_workers: 4
storage:
  backend: sqlite
  database_path: /tmp/cadence.db
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert!((config.convergence.threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.convergence.stability_window, 5);
        assert!((config.convergence.max_delta - 0.02).abs() < f64::EPSILON);
        assert_eq!(config.shadow.sampling_divisor, 20);
        assert_eq!(config.orchestrator.max_workers, 4);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracker:\n  history_capacity: 10\nshadow:\n  enabled: false").unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.tracker.history_capacity, 10);
        assert!(!config.shadow.enabled);
        assert_eq!(config.shadow.evaluation_window, 20);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shadow:\n  sampling_divisor: 0").unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ZeroSamplingDivisor)
        ));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("CADENCE_SHADOW__SAMPLING_DIVISOR", Some("20")),
                ("CADENCE_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load().unwrap();
                assert_eq!(config.shadow.sampling_divisor, 20);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.convergence.threshold = 1.5;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::OutOfUnitRange {
                field: "convergence.threshold",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_zero_window() {
        let mut config = Config::default();
        config.convergence.stability_window = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroStabilityWindow
        ));
    }

    #[test]
    fn test_validate_negative_max_delta() {
        let mut config = Config::default();
        config.convergence.max_delta = -0.1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxDelta(_)
        ));
    }

    #[test]
    fn test_validate_alert_above_hard_stop() {
        let mut config = Config::default();
        config.shadow.alert_threshold = 0.2;
        config.shadow.hard_stop_threshold = 0.15;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::AlertAboveHardStop { .. }
        ));
    }

    #[test]
    fn test_validate_worker_bounds() {
        let mut config = Config::default();
        config.orchestrator.min_workers = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWorkerBounds { min: 0, .. }
        ));

        config.orchestrator.min_workers = 9;
        config.orchestrator.max_workers = 8;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWorkerBounds { min: 9, max: 8 }
        ));
    }

    #[test]
    fn test_validate_zero_queue_depth() {
        let mut config = Config::default();
        config.orchestrator.max_queue_depth = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroQueueDepth
        ));
    }

    #[test]
    fn test_validate_zero_retention_bounds() {
        let mut config = Config::default();
        config.orchestrator.job_retention = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroJobRetention
        ));

        let mut config = Config::default();
        config.scoring.cache_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroCacheCapacity
        ));
    }

    #[test]
    fn test_validate_history_smaller_than_window() {
        let mut config = Config::default();
        config.tracker.history_capacity = 2;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::HistoryTooSmall {
                capacity: 2,
                window: 3
            }
        ));
    }

    #[test]
    fn test_validate_optimizer() {
        let mut config = Config::default();
        config.optimizer.learning_rate = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLearningRate(_)
        ));

        let mut config = Config::default();
        config.optimizer.min_weight = 0.5;
        config.optimizer.max_weight = 0.5;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWeightBounds { .. }
        ));
    }

    #[test]
    fn test_validate_default_weights() {
        let mut config = Config::default();
        config.scoring.default_weights.semantic = -0.1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidDefaultWeights(_)
        ));

        let mut config = Config::default();
        for dimension in Dimension::ALL {
            config.scoring.default_weights.set(dimension, 0.0);
        }
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidDefaultWeights(_)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_database_path_only_for_sqlite() {
        let mut config = Config::default();
        config.storage.database_path = String::new();
        assert!(ConfigLoader::validate(&config).is_ok());

        config.storage.backend = StorageBackend::Sqlite;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }
}
