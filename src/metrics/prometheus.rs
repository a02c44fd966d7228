//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by automl-bench and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all automl-bench metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total runs, labeled by engine and outcome (result, skipped, error, cancelled).
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Run duration in seconds, labeled by engine.
pub static RUN_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of runs currently in progress.
pub static ACTIVE_RUNS: OnceLock<Gauge> = OnceLock::new();

/// Results registry writes, labeled by status (success, failure).
pub static REGISTRY_WRITES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Repeated calls leave the first set of metrics in
/// place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let runs_total = CounterVec::new(
        Opts::new("automl_runs_total", "Total number of engine runs"),
        &["engine", "outcome"],
    )?;

    let run_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "automl_run_duration_seconds",
            "Run duration in seconds, from dataset load to terminal event",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["engine"],
    )?;

    let active_runs = Gauge::new("automl_active_runs", "Number of runs currently in progress")?;

    let registry_writes_total = CounterVec::new(
        Opts::new("automl_registry_writes_total", "Results registry writes"),
        &["status"],
    )?;

    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(run_duration.clone()))?;
    registry.register(Box::new(active_runs.clone()))?;
    registry.register(Box::new(registry_writes_total.clone()))?;

    // Already-initialized statics keep their first value.
    let _ = REGISTRY.set(registry);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = RUN_DURATION.set(run_duration);
    let _ = ACTIVE_RUNS.set(active_runs);
    let _ = REGISTRY_WRITES_TOTAL.set(registry_writes_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, returns a
/// comment line describing the problem instead.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
