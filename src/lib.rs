//! automl-bench: AutoML run orchestration and benchmark comparison.
//!
//! This library runs AutoML engines against tabular datasets, streams
//! progress and resource usage while they train, and keeps a registry of
//! results for side-by-side comparison.

// Core modules
pub mod cli;
pub mod compare;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod registry;

// Re-export commonly used error types
pub use error::{DatasetError, EngineError, RegistryError};
