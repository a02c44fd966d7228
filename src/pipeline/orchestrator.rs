//! Pipeline orchestrator for coordinating engine runs.
//!
//! This module provides the `RunPipeline` that:
//! - Validates run requests
//! - Spawns one task per run, streaming its events over a bounded channel
//! - Limits how many engines train at once
//! - Keeps running totals of run outcomes

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::dataset::{CsvDatasetLoader, DatasetLoader};
use crate::engine::{EngineCatalog, EngineKind};
use crate::metrics::{MetricsCollector, RunOutcome};
use crate::monitor::{ResourceProbe, SysinfoProbe};
use crate::registry::ResultsRegistry;

use super::config::{ConfigError, PipelineConfig};
use super::events::RunEvent;
use super::runner::{ProbeFactory, RunRequest, RunTask};

/// Statistics about pipeline execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Total number of runs that reached an end.
    pub total_runs: u64,
    /// Runs that produced a result.
    pub completed: u64,
    /// Runs the engine declined.
    pub skipped: u64,
    /// Runs that ended in an error.
    pub failed: u64,
    /// Runs abandoned by their consumer.
    pub cancelled: u64,
    /// Average run duration.
    pub average_duration: Duration,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, outcome: RunOutcome, duration: Duration) {
        self.total_runs += 1;
        match outcome {
            RunOutcome::Result => self.completed += 1,
            RunOutcome::Skipped => self.skipped += 1,
            RunOutcome::Error => self.failed += 1,
            RunOutcome::Cancelled => self.cancelled += 1,
        }
        self.update_average_duration(duration);
    }

    /// Updates the running average duration.
    fn update_average_duration(&mut self, duration: Duration) {
        if self.total_runs == 1 {
            self.average_duration = duration;
        } else {
            // Incremental average: avg = avg + (new - avg) / n
            let n = self.total_runs as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_val = duration.as_secs_f64();
            let new_avg = old_avg + (new_val - old_avg) / n;
            self.average_duration = Duration::from_secs_f64(new_avg.max(0.0));
        }
    }
}

/// Live event stream of one run.
///
/// Single pass and not restartable. Calling [`RunStream::cancel`] or dropping
/// the stream cancels the run: nothing further is emitted or persisted.
#[derive(Debug)]
pub struct RunStream {
    run_id: Uuid,
    inner: ReceiverStream<RunEvent>,
    cancelled: bool,
}

impl RunStream {
    fn new(run_id: Uuid, rx: mpsc::Receiver<RunEvent>) -> Self {
        Self {
            run_id,
            inner: ReceiverStream::new(rx),
            cancelled: false,
        }
    }

    /// Identifier of the run, as recorded in its tracing span.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        futures::StreamExt::next(self).await
    }

    /// Stops the run. Buffered events are discarded.
    ///
    /// A cancel that lands after training has finished may still leave the
    /// record persisted: the save happens just before the terminal `result`
    /// is sent.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.inner.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drains the stream and returns every event in order.
    pub async fn collect_all(mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// Drains the stream and returns only its terminal event.
    pub async fn terminal(self) -> Option<RunEvent> {
        self.collect_all()
            .await
            .into_iter()
            .find(RunEvent::is_terminal)
    }
}

impl Stream for RunStream {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Main pipeline that runs engines against datasets.
#[derive(Clone)]
pub struct RunPipeline {
    config: Arc<PipelineConfig>,
    loader: Arc<dyn DatasetLoader>,
    registry: Arc<ResultsRegistry>,
    catalog: EngineCatalog,
    probe_factory: ProbeFactory,
    limiter: Arc<Semaphore>,
    stats: Arc<RwLock<PipelineStats>>,
    metrics: MetricsCollector,
}

impl RunPipeline {
    /// Creates a pipeline that reads CSV datasets from the configured
    /// directory and samples the host for resource usage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(config: PipelineConfig, registry: Arc<ResultsRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        let loader: Arc<dyn DatasetLoader> = Arc::new(CsvDatasetLoader::new(config.datasets_dir.clone()));
        let probe_factory: ProbeFactory =
            Arc::new(|| Box::new(SysinfoProbe::new()) as Box<dyn ResourceProbe>);
        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_runs)),
            config: Arc::new(config),
            loader,
            registry,
            catalog: EngineCatalog::new(),
            probe_factory,
            stats: Arc::new(RwLock::new(PipelineStats::new())),
            metrics: MetricsCollector::new(),
        })
    }

    /// Replaces the dataset loader.
    pub fn with_loader(mut self, loader: Arc<dyn DatasetLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replaces the engine catalog.
    pub fn with_catalog(mut self, catalog: EngineCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the resource probe used by each run's monitor.
    pub fn with_probe_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ResourceProbe> + Send + Sync + 'static,
    {
        self.probe_factory = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResultsRegistry> {
        &self.registry
    }

    /// Returns a snapshot of the run statistics.
    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    /// Starts a run from raw identifiers.
    ///
    /// An invalid request produces a stream holding a single `error` event;
    /// nothing is loaded or persisted. Must be called within a tokio runtime.
    pub fn run(&self, dataset: &str, engine: &str) -> RunStream {
        match RunRequest::parse(dataset, engine) {
            Ok(request) => self.run_request(request),
            Err(e) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(e.to_event());
                self.metrics.run_rejected("invalid");
                let stats = Arc::clone(&self.stats);
                tokio::spawn(async move {
                    stats.write().await.record(RunOutcome::Error, Duration::ZERO);
                });
                RunStream::new(Uuid::new_v4(), rx)
            }
        }
    }

    /// Starts a validated run.
    pub fn run_request(&self, request: RunRequest) -> RunStream {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let engine = request.engine;
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, dataset = %request.dataset, engine = %engine);
        span.in_scope(|| info!("Starting run"));

        let task = RunTask {
            request,
            config: Arc::clone(&self.config),
            loader: Arc::clone(&self.loader),
            registry: Arc::clone(&self.registry),
            catalog: self.catalog.clone(),
            probe_factory: Arc::clone(&self.probe_factory),
            limiter: Arc::clone(&self.limiter),
            tx,
        };
        let stats = Arc::clone(&self.stats);
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            metrics.run_started();
            let outcome = match task.drive().await {
                Some(RunEvent::Result(_)) => RunOutcome::Result,
                Some(RunEvent::Skipped(_)) => RunOutcome::Skipped,
                Some(_) => RunOutcome::Error,
                None => RunOutcome::Cancelled,
            };
            let elapsed = started.elapsed();
            metrics.run_finished(engine.as_str(), outcome, elapsed.as_secs_f64());
            info!(outcome = outcome.as_str(), elapsed_ms = elapsed.as_millis() as u64, "Run finished");
            stats.write().await.record(outcome, elapsed);
        }
        .instrument(span));

        RunStream::new(run_id, rx)
    }

    /// Starts one run per engine on the same dataset, concurrently.
    pub fn run_all(&self, dataset: &str) -> Vec<(EngineKind, RunStream)> {
        EngineKind::ALL
            .iter()
            .map(|kind| (*kind, self.run(dataset, kind.as_str())))
            .collect()
    }
}

impl std::fmt::Debug for RunPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPipeline")
            .field("config", &self.config)
            .field("registry", &self.registry.path())
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{init_metrics, ACTIVE_RUNS, ACTIVE_RUNS_LOCK};
    use crate::pipeline::events::ErrorKind;

    #[test]
    fn test_stats_record() {
        let mut stats = PipelineStats::new();
        stats.record(RunOutcome::Result, Duration::from_secs(2));
        stats.record(RunOutcome::Skipped, Duration::from_secs(4));
        stats.record(RunOutcome::Cancelled, Duration::from_secs(6));
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
        assert!((stats.average_duration.as_secs_f64() - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_stream_yields_nothing() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(RunEvent::log("buffered")).await.unwrap();
        let mut stream = RunStream::new(Uuid::new_v4(), rx);
        stream.cancel();
        assert!(stream.is_cancelled());
        assert!(stream.next_event().await.is_none());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_request_stream() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(ResultsRegistry::new(dir.path().join("results.json")));
        let pipeline = RunPipeline::new(PipelineConfig::default(), registry).unwrap();

        let events = pipeline.run("iris.csv", "nope").collect_all().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RunEvent::Error(f) if f.kind == ErrorKind::Input));
    }

    #[tokio::test]
    async fn test_invalid_request_leaves_active_gauge() {
        let _ = init_metrics();
        let _guard = ACTIVE_RUNS_LOCK.lock().await;
        let dir = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(ResultsRegistry::new(dir.path().join("results.json")));
        let pipeline = RunPipeline::new(PipelineConfig::default(), registry).unwrap();
        let active = || ACTIVE_RUNS.get().map(|g| g.get()).unwrap_or(0.0);

        let before = active();
        for _ in 0..3 {
            pipeline.run("iris.csv", "nope").collect_all().await;
        }
        assert_eq!(active(), before);
    }
}
