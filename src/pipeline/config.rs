//! Pipeline configuration.
//!
//! This module provides configuration options for the run pipeline: storage
//! paths, split settings, the training-row floor, monitoring cadence and
//! per-engine time budgets.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::dataset::{SplitOptions, DEFAULT_MAX_CLASSES};
use crate::engine::{EngineKind, MIN_TRAINING_ROWS};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the run pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Storage settings
    /// Directory holding dataset CSV files.
    pub datasets_dir: PathBuf,
    /// JSON file backing the results registry.
    pub results_path: PathBuf,

    // Data settings
    /// Minimum number of training rows an engine accepts.
    pub min_rows: usize,
    /// Fraction of rows held out for testing.
    pub test_fraction: f64,
    /// Seed for the train/test shuffle.
    pub split_seed: u64,
    /// Numeric targets with at most this many distinct values are classes.
    pub max_classes: usize,
    /// Stratify only when the label has at most this many classes.
    pub stratify_max_classes: usize,

    // Execution settings
    /// Interval between resource monitor ticks while an engine trains.
    pub monitor_interval: Duration,
    /// Capacity of each run's event channel.
    pub event_buffer: usize,
    /// Maximum number of engines training at the same time.
    pub max_concurrent_runs: usize,
    /// Training time budget per engine.
    pub time_budgets: BTreeMap<EngineKind, Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            datasets_dir: PathBuf::from("./datasets"),
            results_path: PathBuf::from("./storage/results.json"),

            min_rows: MIN_TRAINING_ROWS,
            test_fraction: 0.2,
            split_seed: 42,
            max_classes: DEFAULT_MAX_CLASSES,
            stratify_max_classes: 20,

            monitor_interval: Duration::from_millis(1000),
            event_buffer: 64,
            max_concurrent_runs: 4,
            time_budgets: EngineKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_time_budget()))
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AUTOML_DATASETS_DIR`: Dataset directory (default: ./datasets)
    /// - `AUTOML_RESULTS_PATH`: Results store (default: ./storage/results.json)
    /// - `AUTOML_MIN_ROWS`: Training-row floor (default: 50)
    /// - `AUTOML_TEST_FRACTION`: Test fraction (default: 0.2)
    /// - `AUTOML_SPLIT_SEED`: Shuffle seed (default: 42)
    /// - `AUTOML_MAX_CLASSES`: Classification cardinality limit (default: 20)
    /// - `AUTOML_STRATIFY_MAX_CLASSES`: Stratification class limit (default: 20)
    /// - `AUTOML_MONITOR_INTERVAL_MS`: Monitor tick interval (default: 1000)
    /// - `AUTOML_EVENT_BUFFER`: Event channel capacity (default: 64)
    /// - `AUTOML_MAX_CONCURRENT_RUNS`: Concurrent engine limit (default: 4)
    /// - `AUTOML_TIME_BUDGET_<ENGINE>_SECS`: Per-engine budget, e.g.
    ///   `AUTOML_TIME_BUDGET_TPOT_SECS` (default: 120 for tpot, 60 otherwise)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Storage settings
        if let Some(val) = lookup("AUTOML_DATASETS_DIR") {
            config.datasets_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("AUTOML_RESULTS_PATH") {
            config.results_path = PathBuf::from(val);
        }

        // Data settings
        if let Some(val) = lookup("AUTOML_MIN_ROWS") {
            config.min_rows = parse_env_value(&val, "AUTOML_MIN_ROWS")?;
        }

        if let Some(val) = lookup("AUTOML_TEST_FRACTION") {
            config.test_fraction = parse_env_value(&val, "AUTOML_TEST_FRACTION")?;
        }

        if let Some(val) = lookup("AUTOML_SPLIT_SEED") {
            config.split_seed = parse_env_value(&val, "AUTOML_SPLIT_SEED")?;
        }

        if let Some(val) = lookup("AUTOML_MAX_CLASSES") {
            config.max_classes = parse_env_value(&val, "AUTOML_MAX_CLASSES")?;
        }

        if let Some(val) = lookup("AUTOML_STRATIFY_MAX_CLASSES") {
            config.stratify_max_classes = parse_env_value(&val, "AUTOML_STRATIFY_MAX_CLASSES")?;
        }

        // Execution settings
        if let Some(val) = lookup("AUTOML_MONITOR_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "AUTOML_MONITOR_INTERVAL_MS")?;
            config.monitor_interval = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("AUTOML_EVENT_BUFFER") {
            config.event_buffer = parse_env_value(&val, "AUTOML_EVENT_BUFFER")?;
        }

        if let Some(val) = lookup("AUTOML_MAX_CONCURRENT_RUNS") {
            config.max_concurrent_runs = parse_env_value(&val, "AUTOML_MAX_CONCURRENT_RUNS")?;
        }

        for kind in EngineKind::ALL {
            let key = format!("AUTOML_TIME_BUDGET_{}_SECS", kind.as_str().to_ascii_uppercase());
            if let Some(val) = lookup(&key) {
                let secs: u64 = parse_env_value(&val, &key)?;
                config.time_budgets.insert(kind, Duration::from_secs(secs));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_rows == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_rows must be greater than 0".to_string(),
            ));
        }

        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::ValidationFailed(
                "test_fraction must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if self.max_classes < 2 {
            return Err(ConfigError::ValidationFailed(
                "max_classes must be at least 2".to_string(),
            ));
        }

        if self.stratify_max_classes < 2 {
            return Err(ConfigError::ValidationFailed(
                "stratify_max_classes must be at least 2".to_string(),
            ));
        }

        if self.monitor_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "monitor_interval must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_runs must be greater than 0".to_string(),
            ));
        }

        if let Some((kind, _)) = self.time_budgets.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ValidationFailed(format!(
                "time budget for {} must be greater than 0",
                kind
            )));
        }

        Ok(())
    }

    /// Training time budget for an engine.
    pub fn time_budget(&self, kind: EngineKind) -> Duration {
        self.time_budgets
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_time_budget())
    }

    /// Split options derived from this configuration.
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            test_fraction: self.test_fraction,
            seed: self.split_seed,
            stratify_max_classes: self.stratify_max_classes,
        }
    }

    // Builder methods

    /// Sets the dataset directory.
    pub fn with_datasets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.datasets_dir = dir.into();
        self
    }

    /// Sets the results store path.
    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    /// Sets the training-row floor.
    pub fn with_min_rows(mut self, rows: usize) -> Self {
        self.min_rows = rows;
        self
    }

    /// Sets the test fraction.
    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    /// Sets the split seed.
    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    /// Sets the monitor tick interval.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Sets the concurrent engine limit.
    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max;
        self
    }

    /// Sets the time budget of one engine.
    pub fn with_time_budget(mut self, kind: EngineKind, budget: Duration) -> Self {
        self.time_budgets.insert(kind, budget);
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
