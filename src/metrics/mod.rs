//! Metrics module for Prometheus-based monitoring.
//!
//! Records run outcomes, run durations, in-flight runs and registry writes.
//!
//! # Example
//!
//! ```ignore
//! use automl_bench::metrics::{init_metrics, export_metrics, MetricsCollector, RunOutcome};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.run_started();
//! collector.run_finished("flaml", RunOutcome::Result, 12.5);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, RunOutcome};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{ACTIVE_RUNS, REGISTRY, REGISTRY_WRITES_TOTAL, RUNS_TOTAL, RUN_DURATION};

/// Serializes tests that move the `ACTIVE_RUNS` gauge.
#[cfg(test)]
pub(crate) static ACTIVE_RUNS_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
