//! Engine adapters.
//!
//! Every training engine is wrapped behind [`EngineAdapter`], which takes a
//! prepared [`SplitBundle`] and returns an [`EngineResult`]. The set of
//! engines is closed: [`EngineKind`] enumerates them and maps each to its
//! built-in adapter.
//!
//! Engines run on a blocking worker thread. They observe the cancel flag in
//! [`TrainingContext`] between candidate models and stop evaluating new
//! candidates once their time budget is spent.

pub mod autogluon;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod flaml;
pub mod h2o;
pub mod models;
pub mod pycaret;
pub mod scoring;
pub mod search;
pub mod tpot;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dataset::SplitBundle;
use crate::error::EngineError;

pub use models::{Model, Problem};
pub use scoring::{primary_metric, score, MetricMap};

/// Minimum number of training rows an engine will accept.
pub const MIN_TRAINING_ROWS: usize = 50;

/// The closed set of supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Flaml,
    Tpot,
    H2o,
    AutoGluon,
    PyCaret,
}

impl EngineKind {
    pub const ALL: [EngineKind; 5] = [
        EngineKind::Flaml,
        EngineKind::Tpot,
        EngineKind::H2o,
        EngineKind::AutoGluon,
        EngineKind::PyCaret,
    ];

    /// Identifier used in requests and stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Flaml => "flaml",
            EngineKind::Tpot => "tpot",
            EngineKind::H2o => "h2o",
            EngineKind::AutoGluon => "autogluon",
            EngineKind::PyCaret => "pycaret",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            EngineKind::Flaml => "FLAML",
            EngineKind::Tpot => "TPOT",
            EngineKind::H2o => "H2O",
            EngineKind::AutoGluon => "AutoGluon",
            EngineKind::PyCaret => "PyCaret",
        }
    }

    /// Default training time budget.
    pub fn default_time_budget(&self) -> Duration {
        match self {
            EngineKind::Tpot => Duration::from_secs(120),
            _ => Duration::from_secs(60),
        }
    }

    /// The built-in adapter for this engine.
    pub fn adapter(&self) -> Arc<dyn EngineAdapter> {
        match self {
            EngineKind::Flaml => Arc::new(flaml::FlamlEngine),
            EngineKind::Tpot => Arc::new(tpot::TpotEngine::default()),
            EngineKind::H2o => Arc::new(h2o::H2oEngine),
            EngineKind::AutoGluon => Arc::new(autogluon::AutoGluonEngine),
            EngineKind::PyCaret => Arc::new(pycaret::PyCaretEngine),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an engine identifier is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown engine '{0}'. Supported engines: flaml, tpot, h2o, autogluon, pycaret")]
pub struct UnknownEngine(pub String);

impl FromStr for EngineKind {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flaml" => Ok(EngineKind::Flaml),
            "tpot" => Ok(EngineKind::Tpot),
            "h2o" => Ok(EngineKind::H2o),
            "autogluon" => Ok(EngineKind::AutoGluon),
            "pycaret" => Ok(EngineKind::PyCaret),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}

/// One trained candidate and its test metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelScore {
    pub model_id: String,
    pub metrics: MetricMap,
}

/// Outcome of an engine run.
///
/// A skipped result carries only a reason. A completed result has a
/// non-empty leaderboard whose first entry is the best model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineResult {
    pub skipped: bool,
    pub reason: Option<String>,
    pub best_model: Option<String>,
    pub metrics: MetricMap,
    pub leaderboard: Vec<ModelScore>,
}

impl EngineResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            skipped: true,
            reason: Some(if reason.trim().is_empty() {
                "skipped".to_string()
            } else {
                reason
            }),
            best_model: None,
            metrics: MetricMap::new(),
            leaderboard: Vec::new(),
        }
    }

    /// Builds a completed result from a leaderboard ordered best first.
    pub fn completed(engine: EngineKind, leaderboard: Vec<ModelScore>) -> Result<Self, EngineError> {
        let best = leaderboard
            .first()
            .ok_or_else(|| EngineError::EmptyLeaderboard(engine.to_string()))?;
        Ok(Self {
            skipped: false,
            reason: None,
            best_model: Some(best.model_id.clone()),
            metrics: best.metrics.clone(),
            leaderboard,
        })
    }

    /// Checks the skipped/completed invariant for results built by hand.
    pub fn validate(&self, engine: EngineKind) -> Result<(), EngineError> {
        if self.skipped {
            return match &self.reason {
                Some(r) if !r.trim().is_empty() => Ok(()),
                _ => Err(EngineError::InvalidData(format!(
                    "engine '{engine}' skipped without a reason"
                ))),
            };
        }
        let first = self
            .leaderboard
            .first()
            .ok_or_else(|| EngineError::EmptyLeaderboard(engine.to_string()))?;
        if self.best_model.as_deref() != Some(first.model_id.as_str()) {
            return Err(EngineError::InvalidData(format!(
                "engine '{engine}' best model does not lead its leaderboard"
            )));
        }
        Ok(())
    }
}

/// Inputs handed to an adapter for a single run.
pub struct TrainingContext<'a> {
    pub split: &'a SplitBundle,
    pub time_budget: Duration,
    pub min_rows: usize,
    cancel: &'a AtomicBool,
    started: Instant,
}

impl<'a> TrainingContext<'a> {
    pub fn new(split: &'a SplitBundle, time_budget: Duration, min_rows: usize, cancel: &'a AtomicBool) -> Self {
        Self {
            split,
            time_budget,
            min_rows,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` once the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn budget_spent(&self) -> bool {
        self.started.elapsed() >= self.time_budget
    }

    /// A skipped result when the training partition is below the row floor.
    pub fn below_row_floor(&self, engine: EngineKind) -> Option<EngineResult> {
        let n = self.split.n_train();
        (n < self.min_rows).then(|| {
            EngineResult::skipped(format!(
                "{} skipped: need >= {} training rows, got {}",
                engine.display_name(),
                self.min_rows,
                n
            ))
        })
    }
}

/// Uniform capability over a concrete training engine.
pub trait EngineAdapter: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Trains candidates on the split and reports the leaderboard.
    ///
    /// Datasets below the training-row floor are reported as skipped rather
    /// than failed.
    fn run(&self, ctx: &TrainingContext<'_>) -> Result<EngineResult, EngineError>;
}

/// Adapter lookup with per-engine overrides.
#[derive(Clone, Default)]
pub struct EngineCatalog {
    overrides: HashMap<EngineKind, Arc<dyn EngineAdapter>>,
}

impl EngineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the adapter used for `adapter.kind()`.
    pub fn with_adapter(mut self, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.overrides.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: EngineKind) -> Arc<dyn EngineAdapter> {
        self.overrides
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.adapter())
    }
}

impl fmt::Debug for EngineCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCatalog")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}
