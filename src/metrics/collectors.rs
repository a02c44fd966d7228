//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{ACTIVE_RUNS, REGISTRY_WRITES_TOTAL, RUNS_TOTAL, RUN_DURATION};

/// Terminal outcome of a run, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Result,
    Skipped,
    Error,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Result => "result",
            RunOutcome::Skipped => "skipped",
            RunOutcome::Error => "error",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// Metrics collector for recording run and registry metrics.
///
/// Every method is a no-op until `init_metrics()` has been called, so library
/// users and tests never need to set up Prometheus.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Marks a run as started.
    pub fn run_started(&self) {
        if let Some(active) = ACTIVE_RUNS.get() {
            active.inc();
        }
    }

    /// Records a finished run.
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine identifier, e.g. "flaml"
    /// * `outcome` - How the run ended
    /// * `duration_secs` - Wall time from dataset load to terminal event
    pub fn run_finished(&self, engine: &str, outcome: RunOutcome, duration_secs: f64) {
        if let Some(active) = ACTIVE_RUNS.get() {
            active.dec();
        }
        self.record_run(engine, outcome, duration_secs);
    }

    /// Records a request rejected before its run started. The active gauge
    /// is left alone since `run_started` was never called.
    pub fn run_rejected(&self, engine: &str) {
        self.record_run(engine, RunOutcome::Error, 0.0);
    }

    fn record_run(&self, engine: &str, outcome: RunOutcome, duration_secs: f64) {
        if let Some(runs_total) = RUNS_TOTAL.get() {
            runs_total
                .with_label_values(&[engine, outcome.as_str()])
                .inc();
        }

        if let Some(run_duration) = RUN_DURATION.get() {
            run_duration
                .with_label_values(&[engine])
                .observe(duration_secs);
        }

        tracing::trace!(
            engine = engine,
            outcome = outcome.as_str(),
            duration_secs = duration_secs,
            "Recorded run metric"
        );
    }

    /// Records a results registry write.
    pub fn record_registry_write(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(writes) = REGISTRY_WRITES_TOTAL.get() {
            writes.with_label_values(&[status]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{init_metrics, ACTIVE_RUNS_LOCK};

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RunOutcome::Result.as_str(), "result");
        assert_eq!(RunOutcome::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_collector_records_after_init() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        let before = RUNS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["collector-test", "skipped"]).get())
            .unwrap_or(0.0);

        let _guard = ACTIVE_RUNS_LOCK.blocking_lock();
        collector.run_started();
        collector.run_finished("collector-test", RunOutcome::Skipped, 0.25);
        collector.record_registry_write(true);

        let after = RUNS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["collector-test", "skipped"]).get())
            .unwrap_or(0.0);
        assert_eq!(after, before + 1.0);
    }

    #[test]
    fn test_rejected_run_counts_as_error() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        let count = || {
            RUNS_TOTAL
                .get()
                .map(|c| c.with_label_values(&["rejected-test", "error"]).get())
                .unwrap_or(0.0)
        };
        let before = count();

        collector.run_rejected("rejected-test");
        collector.run_rejected("rejected-test");

        assert_eq!(count(), before + 2.0);
    }

    #[test]
    fn test_collector_without_init_does_not_panic() {
        let collector = MetricsCollector::default();
        collector.record_registry_write(false);
    }
}
