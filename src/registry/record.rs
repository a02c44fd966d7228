use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::TaskKind;
use crate::engine::{EngineKind, EngineResult, MetricMap};
use crate::monitor::ResourceSample;

/// Metric name to stored value. Values are numeric in practice but the store
/// tolerates anything JSON can hold.
pub type Metrics = BTreeMap<String, serde_json::Value>;

/// One row of a stored leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub model_id: String,
    /// Metric values, flattened next to `model_id` in the stored JSON.
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// A completed run as persisted in the results registry.
///
/// Identity is the `(dataset, tool)` pair; a later record with the same pair
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Dataset identifier.
    pub dataset: String,
    /// Engine identifier, e.g. "flaml".
    pub tool: String,
    pub task: TaskKind,
    /// Best model id; empty until the registry fills it in.
    #[serde(default)]
    pub best_model: String,
    #[serde(default)]
    pub metrics: Metrics,
    /// Resources consumed during training.
    #[serde(default)]
    pub system: ResourceSample,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Normalizes a completed engine result into a record.
    pub fn from_engine_result(
        dataset: &str,
        engine: EngineKind,
        task: TaskKind,
        result: &EngineResult,
        system: ResourceSample,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            tool: engine.as_str().to_string(),
            task,
            best_model: result.best_model.clone().unwrap_or_default(),
            metrics: to_json_metrics(&result.metrics),
            system,
            leaderboard: result
                .leaderboard
                .iter()
                .map(|entry| LeaderboardEntry {
                    model_id: entry.model_id.clone(),
                    metrics: to_json_metrics(&entry.metrics),
                })
                .collect(),
            created_at: Some(Utc::now()),
        }
    }

    /// Whether this record has the given identity.
    pub fn has_key(&self, dataset: &str, tool: &str) -> bool {
        self.dataset == dataset && self.tool == tool
    }

    /// Numeric value of a metric; `None` when absent, non-numeric or non-finite.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite())
    }
}

fn to_json_metrics(metrics: &MetricMap) -> Metrics {
    metrics
        .iter()
        .map(|(name, value)| {
            let json = serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
            (name.clone(), json)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ModelScore;
    use serde_json::json;

    fn engine_result() -> EngineResult {
        let leaderboard = vec![
            ModelScore {
                model_id: "knn".to_string(),
                metrics: MetricMap::from([("accuracy".to_string(), 0.95)]),
            },
            ModelScore {
                model_id: "ridge".to_string(),
                metrics: MetricMap::from([("accuracy".to_string(), f64::NAN)]),
            },
        ];
        EngineResult::completed(EngineKind::Flaml, leaderboard).unwrap()
    }

    #[test]
    fn test_from_engine_result() {
        let record = RunRecord::from_engine_result(
            "iris.csv",
            EngineKind::Flaml,
            TaskKind::Classification,
            &engine_result(),
            ResourceSample::default(),
        );
        assert_eq!(record.tool, "flaml");
        assert_eq!(record.best_model, "knn");
        assert_eq!(record.metric("accuracy"), Some(0.95));
        assert_eq!(record.leaderboard.len(), 2);
        assert_eq!(record.leaderboard[1].metrics["accuracy"], serde_json::Value::Null);
        assert!(record.has_key("iris.csv", "flaml"));
        assert!(record.created_at.is_some());
    }

    #[test]
    fn test_stored_layout() {
        let record = RunRecord::from_engine_result(
            "iris.csv",
            EngineKind::Flaml,
            TaskKind::Classification,
            &engine_result(),
            ResourceSample {
                train_time_secs: 3.5,
                cpu_peak_percent: 80.0,
                ram_peak_gb: 1.25,
            },
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["best_model"], "knn");
        assert_eq!(value["task"], "classification");
        assert_eq!(value["system"]["train_time_sec"], 3.5);
        assert_eq!(value["leaderboard"][0]["model_id"], "knn");
        assert_eq!(value["leaderboard"][0]["accuracy"], 0.95);
    }

    #[test]
    fn test_reads_record_without_timestamp() {
        let value = json!({
            "dataset": "house.csv",
            "tool": "h2o",
            "task": "regression",
            "best_model": "GLM_1",
            "metrics": {"rmse": 1.5, "note": "n/a"},
            "system": {"train_time_sec": 2.0, "cpu_peak_percent": 10.0, "ram_peak_gb": 0.5},
            "leaderboard": [{"model_id": "GLM_1", "rmse": 1.5}]
        });
        let record: RunRecord = serde_json::from_value(value).unwrap();
        assert!(record.created_at.is_none());
        assert_eq!(record.metric("rmse"), Some(1.5));
        assert_eq!(record.metric("note"), None);
        assert_eq!(record.leaderboard[0].metrics["rmse"], 1.5);
    }
}
