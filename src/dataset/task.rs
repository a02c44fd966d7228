//! Task-kind detection.

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

use super::frame::DataFrame;

/// Default cardinality at or below which a numeric target is treated as
/// a class label.
pub const DEFAULT_MAX_CLASSES: usize = 20;

/// Kind of supervised learning problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Classification => "classification",
            TaskKind::Regression => "regression",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the task kind and target column of a frame.
///
/// The target is the last column. Text targets are always classification;
/// numeric targets are classification when they have at most `max_classes`
/// distinct values and regression otherwise.
pub fn detect_task(frame: &DataFrame, max_classes: usize) -> Result<(TaskKind, String), DatasetError> {
    let target = frame
        .last_column()
        .ok_or_else(|| DatasetError::TargetNotFound("<none>".to_string()))?;

    let kind = if !target.is_numeric() || target.distinct_count() <= max_classes {
        TaskKind::Classification
    } else {
        TaskKind::Regression
    };

    Ok((kind, target.name.clone()))
}
