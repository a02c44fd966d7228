//! Single-run execution.
//!
//! This module provides the `RunTask` which drives one (dataset, engine) run
//! through load, task detection, split, monitored training and persistence,
//! emitting events as it goes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dataset::{detect_task, DatasetLoader, SplitBundle, Splitter, TaskKind};
use crate::engine::{EngineCatalog, EngineKind, EngineResult, TrainingContext, UnknownEngine};
use crate::error::{DatasetError, EngineError};
use crate::monitor::{ResourceMonitor, ResourceProbe, ResourceSample};
use crate::registry::{ResultsRegistry, RunRecord};

use super::config::PipelineConfig;
use super::events::{ErrorKind, RunCompleted, RunEvent, RunSkipped};

/// Errors that end a run before it produces a result.
#[derive(Debug, Error)]
pub enum RunError {
    /// The dataset identifier was empty.
    #[error("Dataset identifier must not be empty")]
    EmptyDataset,

    /// The engine identifier is not supported.
    #[error(transparent)]
    UnknownEngine(#[from] UnknownEngine),

    /// Loading, detection or splitting failed.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The consumer went away.
    #[error("Run was cancelled")]
    Cancelled,
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::EmptyDataset | RunError::UnknownEngine(_) => ErrorKind::Input,
            RunError::Dataset(_) => ErrorKind::Data,
            RunError::Engine(_) | RunError::Cancelled => ErrorKind::Engine,
        }
    }

    /// Terminal event describing this error.
    pub fn to_event(&self) -> RunEvent {
        RunEvent::error(self.kind(), self.to_string())
    }
}

/// A validated run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub dataset: String,
    pub engine: EngineKind,
}

impl RunRequest {
    pub fn new(dataset: impl Into<String>, engine: EngineKind) -> Result<Self, RunError> {
        let dataset = dataset.into().trim().to_string();
        if dataset.is_empty() {
            return Err(RunError::EmptyDataset);
        }
        Ok(Self { dataset, engine })
    }

    /// Validates raw identifiers.
    pub fn parse(dataset: &str, engine: &str) -> Result<Self, RunError> {
        let engine = engine.parse::<EngineKind>()?;
        Self::new(dataset, engine)
    }
}

/// Creates a fresh resource probe for each run.
pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn ResourceProbe> + Send + Sync>;

/// Everything one run needs, owned by the run's task.
pub(crate) struct RunTask {
    pub request: RunRequest,
    pub config: Arc<PipelineConfig>,
    pub loader: Arc<dyn DatasetLoader>,
    pub registry: Arc<ResultsRegistry>,
    pub catalog: EngineCatalog,
    pub probe_factory: ProbeFactory,
    pub limiter: Arc<Semaphore>,
    pub tx: mpsc::Sender<RunEvent>,
}

impl RunTask {
    /// Runs to completion and returns the terminal event that was emitted, or
    /// `None` when the consumer cancelled first.
    pub async fn drive(self) -> Option<RunEvent> {
        let terminal = match self.execute().await {
            Ok(event) => event,
            Err(RunError::Cancelled) => {
                info!(
                    dataset = %self.request.dataset,
                    engine = %self.request.engine,
                    "Run cancelled by consumer"
                );
                return None;
            }
            Err(e) => {
                warn!(
                    dataset = %self.request.dataset,
                    engine = %self.request.engine,
                    kind = %e.kind(),
                    error = %e,
                    "Run failed"
                );
                e.to_event()
            }
        };

        if self.send(terminal.clone()).await {
            Some(terminal)
        } else {
            None
        }
    }

    /// Sends an event, ignoring send errors. Returns false once the consumer
    /// is gone.
    async fn send(&self, event: RunEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn log(&self, message: impl Into<String>) -> Result<(), RunError> {
        if self.send(RunEvent::log(message)).await {
            Ok(())
        } else {
            Err(RunError::Cancelled)
        }
    }

    async fn execute(&self) -> Result<RunEvent, RunError> {
        let RunRequest { dataset, engine } = &self.request;

        self.log(format!("Loading dataset '{dataset}'")).await?;
        let frame = self.loader.load(dataset).await?;
        self.log(format!(
            "Loaded {} rows x {} columns",
            frame.n_rows(),
            frame.n_cols()
        ))
        .await?;

        let (task, target) = detect_task(&frame, self.config.max_classes)?;
        info!(dataset = %dataset, task = %task, target = %target, "Task detected");
        self.log(format!("Task detected: {task} (target '{target}')")).await?;

        let split = Splitter::new(self.config.split_options()).split(&frame, &target, task)?;
        drop(frame);
        if !split.dropped_columns.is_empty() {
            self.log(format!(
                "Dropped leakage columns: {}",
                split.dropped_columns.join(", ")
            ))
            .await?;
        }
        if task == TaskKind::Classification && !split.stratified {
            self.log("Stratified split not possible, falling back to a random split")
                .await?;
        }
        self.log(format!(
            "Split complete: {} train / {} test rows, {} features",
            split.n_train(),
            split.n_test(),
            split.n_features()
        ))
        .await?;

        let budget = self.config.time_budget(*engine);
        self.log(format!(
            "Training with {} (budget {}s)",
            engine.display_name(),
            budget.as_secs()
        ))
        .await?;

        let (result, system) = self.train(split, budget).await?;

        if result.skipped {
            let reason = result
                .reason
                .unwrap_or_else(|| format!("{} skipped", engine.display_name()));
            warn!(dataset = %dataset, engine = %engine, reason = %reason, "Engine skipped run");
            return Ok(RunEvent::Skipped(RunSkipped {
                dataset: dataset.clone(),
                tool: engine.as_str().to_string(),
                reason,
            }));
        }

        self.log(format!(
            "Training complete: best model {}",
            result.best_model.as_deref().unwrap_or("?")
        ))
        .await?;

        let record = RunRecord::from_engine_result(dataset, *engine, task, &result, system);
        if self.tx.is_closed() {
            return Err(RunError::Cancelled);
        }

        match self.registry.save(record.clone()).await {
            Ok(stored) => Ok(RunEvent::Result(RunCompleted {
                record: stored,
                persisted: true,
            })),
            Err(e) => {
                error!(dataset = %dataset, engine = %engine, error = %e, "Failed to persist run record");
                self.log(format!("Failed to persist result: {e}")).await?;
                Ok(RunEvent::Result(RunCompleted {
                    record,
                    persisted: false,
                }))
            }
        }
    }

    /// Trains on a blocking worker while ticking the resource monitor.
    async fn train(
        &self,
        split: SplitBundle,
        budget: Duration,
    ) -> Result<(EngineResult, ResourceSample), RunError> {
        let engine = self.request.engine;

        let _permit = tokio::select! {
            permit = self.limiter.acquire() => permit
                .map_err(|e| EngineError::TrainingFailed {
                    engine: engine.to_string(),
                    message: e.to_string(),
                })?,
            _ = self.tx.closed() => return Err(RunError::Cancelled),
        };

        let adapter = self.catalog.get(engine);
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let min_rows = self.config.min_rows;

        let mut monitor = ResourceMonitor::new((self.probe_factory)());
        let mut handle = monitor.start();
        let started = Instant::now();

        let mut worker = tokio::task::spawn_blocking(move || {
            let ctx = TrainingContext::new(&split, budget, min_rows, &worker_cancel);
            adapter.run(&ctx)
        });

        let mut ticker = tokio::time::interval(self.config.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                joined = &mut worker => break joined,
                _ = ticker.tick() => {
                    if let Some(snapshot) = monitor.tick(&mut handle) {
                        if !self.send(RunEvent::Stats(snapshot)).await {
                            cancel.store(true, Ordering::Relaxed);
                            let _ = worker.await;
                            return Err(RunError::Cancelled);
                        }
                    }
                }
                _ = self.tx.closed() => {
                    cancel.store(true, Ordering::Relaxed);
                    let _ = worker.await;
                    return Err(RunError::Cancelled);
                }
            }
        };

        monitor.tick(&mut handle);
        let sample = monitor.end(handle);
        debug!(
            engine = %engine,
            elapsed_ms = started.elapsed().as_millis() as u64,
            cpu_peak = sample.cpu_peak_percent,
            ram_peak = sample.ram_peak_gb,
            "Engine finished"
        );

        let result = match joined {
            Ok(Ok(result)) => result,
            Ok(Err(EngineError::Cancelled)) => return Err(RunError::Cancelled),
            Ok(Err(e)) => return Err(e.into()),
            Err(join) => return Err(EngineError::WorkerPanicked(join.to_string()).into()),
        };
        result.validate(engine)?;
        Ok((result, sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parse() {
        let request = RunRequest::parse(" iris.csv ", "FLAML").unwrap();
        assert_eq!(request.dataset, "iris.csv");
        assert_eq!(request.engine, EngineKind::Flaml);

        let err = RunRequest::parse("iris.csv", "sklearn").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("sklearn"));

        let err = RunRequest::parse("  ", "tpot").unwrap_err();
        assert!(matches!(err, RunError::EmptyDataset));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_error_kinds() {
        let data: RunError = DatasetError::NotFound("x.csv".to_string()).into();
        assert_eq!(data.kind(), ErrorKind::Data);
        assert_eq!(data.to_string(), "Dataset 'x.csv' not found");

        let engine: RunError = EngineError::WorkerPanicked("boom".to_string()).into();
        assert_eq!(engine.kind(), ErrorKind::Engine);
        match engine.to_event() {
            RunEvent::Error(failure) => {
                assert_eq!(failure.kind, ErrorKind::Engine);
                assert!(failure.message.contains("boom"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
