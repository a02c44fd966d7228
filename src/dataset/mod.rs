//! Dataset collaborators for the run pipeline.
//!
//! This module provides the pieces the pipeline consumes through narrow
//! contracts:
//!
//! - **Loader**: resolves a dataset identifier into a [`DataFrame`]
//! - **Task detection**: picks the target column and [`TaskKind`]
//! - **Splitter**: removes leakage columns and builds a [`SplitBundle`]
//!
//! Each step returns new values; nothing here mutates a frame in place.

pub mod frame;
pub mod loader;
pub mod split;
pub mod task;

pub use frame::{Column, ColumnData, DataFrame};
pub use loader::{parse_csv, CsvDatasetLoader, DatasetInfo, DatasetLoader};
pub use split::{leakage_columns, Labels, SplitBundle, SplitOptions, Splitter};
pub use task::{detect_task, TaskKind, DEFAULT_MAX_CLASSES};
