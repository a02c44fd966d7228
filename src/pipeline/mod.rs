//! Run orchestration for AutoML benchmarks.
//!
//! This module turns a (dataset, engine) request into a live stream of
//! events and a persisted run record.
//!
//! # Architecture
//!
//! - **Orchestrator**: `RunPipeline` validates requests, spawns one task per
//!   run and hands back a `RunStream`
//! - **Runner**: `RunTask` drives a single run through load, detection,
//!   split, monitored training and persistence
//! - **Events**: the `log`/`stats` progress events and the terminal
//!   `result`/`skipped`/`error` event
//! - **Config**: `PipelineConfig`, built from defaults or `AUTOML_*`
//!   environment variables
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use automl_bench::pipeline::{PipelineConfig, RunEvent, RunPipeline};
//! use automl_bench::registry::ResultsRegistry;
//!
//! let config = PipelineConfig::from_env()?;
//! let registry = Arc::new(ResultsRegistry::new(config.results_path.clone()));
//! let pipeline = RunPipeline::new(config, registry)?;
//!
//! let mut stream = pipeline.run("iris.csv", "flaml");
//! while let Some(event) = stream.next_event().await {
//!     match event {
//!         RunEvent::Log(line) => println!("{line}"),
//!         RunEvent::Result(done) => println!("best: {}", done.record.best_model),
//!         other => println!("{other:?}"),
//!     }
//! }
//! ```
//!
//! Dropping the stream (or calling `cancel`) stops the run; a cancelled run
//! never writes to the registry.

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod runner;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use events::{ErrorKind, RunCompleted, RunEvent, RunFailure, RunSkipped};
pub use orchestrator::{PipelineStats, RunPipeline, RunStream};
pub use runner::{ProbeFactory, RunError, RunRequest};
