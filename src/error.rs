//! Error types for automl-bench operations.
//!
//! Defines error types for the subsystems below the run pipeline:
//! - Dataset loading, parsing and splitting
//! - Engine adapters
//! - Results registry persistence
//!
//! The pipeline converts all of these into structured events; none of them
//! crosses the event stream boundary directly.

use thiserror::Error;

/// Errors that can occur while loading or preparing a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset '{0}' not found")]
    NotFound(String),

    #[error("Invalid dataset identifier '{0}': must be a plain file name")]
    InvalidIdentifier(String),

    #[error("Failed to parse dataset '{name}': {message}")]
    Parse { name: String, message: String },

    #[error("Dataset '{0}' has no rows")]
    Empty(String),

    #[error("Dataset needs at least one feature column besides the target '{0}'")]
    NoFeatures(String),

    #[error("Target column '{0}' not found")]
    TargetNotFound(String),

    #[error("Not enough labelled rows to split: {0}")]
    InsufficientRows(usize),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an engine adapter during training.
///
/// A dataset that is too small is not an error: adapters report it as a
/// skipped [`EngineResult`](crate::engine::EngineResult).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine '{engine}' failed: {message}")]
    TrainingFailed { engine: String, message: String },

    #[error("Engine '{0}' produced an empty leaderboard")]
    EmptyLeaderboard(String),

    #[error("Invalid training data: {0}")]
    InvalidData(String),

    #[error("Engine run was cancelled")]
    Cancelled,

    #[error("Engine worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Errors that can occur during results registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry store '{path}' is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("Failed to persist registry: {0}")]
    Persist(String),

    #[error("Registry worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tempfile::PersistError> for RegistryError {
    fn from(err: tempfile::PersistError) -> Self {
        RegistryError::Persist(err.error.to_string())
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(err: tokio::task::JoinError) -> Self {
        RegistryError::Worker(err.to_string())
    }
}
