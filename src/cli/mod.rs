//! Command-line interface for automl-bench.
//!
//! Provides commands for running engines, benchmarking every engine on a
//! dataset, comparing stored results and managing datasets.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
