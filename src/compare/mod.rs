//! Benchmark comparison over stored run records.
//!
//! Given a dataset and a selected tool, [`ComparisonService`] splits the
//! dataset's records into the selected one and the rest, and reports which
//! tool holds the best value for every metric.

pub mod service;

pub use service::{best_per_metric, ComparisonService, ComparisonView, MetricLeader};
