use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{ResultsRegistry, RunRecord};

/// The tool holding the best value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLeader {
    pub tool: String,
    pub value: f64,
    pub model: String,
}

/// Comparison of one tool's record against every other tool on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonView {
    pub dataset: String,
    pub selected: Option<RunRecord>,
    pub others: Vec<RunRecord>,
    pub best_per_metric: BTreeMap<String, MetricLeader>,
}

/// For every metric present in `records`, the record with the greatest value.
///
/// Non-numeric and non-finite values are ignored. On ties the record seen
/// first wins.
pub fn best_per_metric(records: &[RunRecord]) -> BTreeMap<String, MetricLeader> {
    let mut best: BTreeMap<String, MetricLeader> = BTreeMap::new();
    for record in records {
        for name in record.metrics.keys() {
            let Some(value) = record.metric(name) else {
                continue;
            };
            match best.get(name) {
                Some(leader) if value <= leader.value => {}
                _ => {
                    best.insert(
                        name.clone(),
                        MetricLeader {
                            tool: record.tool.clone(),
                            value,
                            model: record.best_model.clone(),
                        },
                    );
                }
            }
        }
    }
    best
}

/// Answers benchmark queries from the results registry.
#[derive(Debug, Clone)]
pub struct ComparisonService {
    registry: Arc<ResultsRegistry>,
}

impl ComparisonService {
    pub fn new(registry: Arc<ResultsRegistry>) -> Self {
        Self { registry }
    }

    /// Compares `tool`'s record on `dataset` against the other tools.
    ///
    /// `selected` is `None` when the tool has no record for the dataset; the
    /// best-per-metric table still covers every record of the dataset. If the
    /// store holds more than one record for the tool, the last one wins.
    pub async fn compare(&self, dataset: &str, tool: &str) -> Result<ComparisonView, RegistryError> {
        let records = self.registry.records_for_dataset(dataset).await?;
        let best = best_per_metric(&records);

        let (mut selected, others): (Vec<RunRecord>, Vec<RunRecord>) =
            records.into_iter().partition(|r| r.tool == tool);

        debug!(
            dataset,
            tool,
            found = !selected.is_empty(),
            others = others.len(),
            "Comparison computed"
        );

        Ok(ComparisonView {
            dataset: dataset.to_string(),
            selected: selected.pop(),
            others,
            best_per_metric: best,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TaskKind;
    use crate::monitor::ResourceSample;
    use crate::registry::Metrics;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(tool: &str, metrics: Metrics) -> RunRecord {
        RunRecord {
            dataset: "d.csv".to_string(),
            tool: tool.to_string(),
            task: TaskKind::Classification,
            best_model: format!("{tool}-model"),
            metrics,
            system: ResourceSample::default(),
            leaderboard: Vec::new(),
            created_at: None,
        }
    }

    fn acc(value: serde_json::Value) -> Metrics {
        Metrics::from([("accuracy".to_string(), value)])
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let records = vec![
            record("A", acc(json!(0.7))),
            record("B", acc(json!(0.9))),
            record("C", acc(json!(0.9))),
        ];
        let best = best_per_metric(&records);
        let leader = &best["accuracy"];
        assert_eq!(leader.tool, "B");
        assert_eq!(leader.value, 0.9);
        assert_eq!(leader.model, "B-model");
    }

    #[test]
    fn test_non_numeric_values_ignored() {
        let records = vec![
            record("A", acc(json!("high"))),
            record("B", acc(json!(0.4))),
            record("C", acc(serde_json::Value::Null)),
        ];
        let best = best_per_metric(&records);
        assert_eq!(best["accuracy"].tool, "B");

        let only_text = vec![record("A", acc(json!("n/a")))];
        assert!(best_per_metric(&only_text).is_empty());
    }

    #[test]
    fn test_every_metric_uses_greatest_value() {
        let mut a = Metrics::new();
        a.insert("rmse".to_string(), json!(1.0));
        a.insert("r2".to_string(), json!(0.8));
        let mut b = Metrics::new();
        b.insert("rmse".to_string(), json!(2.0));
        b.insert("r2".to_string(), json!(0.6));

        let best = best_per_metric(&[record("A", a), record("B", b)]);
        assert_eq!(best["r2"].tool, "A");
        assert_eq!(best["rmse"].tool, "B");
        let names: Vec<_> = best.keys().cloned().collect();
        assert_eq!(names, vec!["r2", "rmse"]);
    }

    #[tokio::test]
    async fn test_compare_partitions_records() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ResultsRegistry::new(dir.path().join("results.json")));
        registry.save(record("A", acc(json!(0.7)))).await.unwrap();
        registry.save(record("B", acc(json!(0.9)))).await.unwrap();
        registry.save(record("C", acc(json!(0.9)))).await.unwrap();
        let mut elsewhere = record("A", acc(json!(1.0)));
        elsewhere.dataset = "other.csv".to_string();
        registry.save(elsewhere).await.unwrap();

        let service = ComparisonService::new(Arc::clone(&registry));
        let view = service.compare("d.csv", "C").await.unwrap();
        assert_eq!(view.selected.as_ref().map(|r| r.tool.as_str()), Some("C"));
        let others: Vec<_> = view.others.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(others, vec!["A", "B"]);
        assert_eq!(view.best_per_metric["accuracy"].tool, "B");

        let again = service.compare("d.csv", "C").await.unwrap();
        assert_eq!(view, again);
    }

    #[tokio::test]
    async fn test_compare_without_selected_record() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ResultsRegistry::new(dir.path().join("results.json")));
        registry.save(record("A", acc(json!(0.7)))).await.unwrap();

        let view = ComparisonService::new(registry)
            .compare("d.csv", "tpot")
            .await
            .unwrap();
        assert!(view.selected.is_none());
        assert_eq!(view.others.len(), 1);
        assert_eq!(view.best_per_metric["accuracy"].tool, "A");
    }

    #[tokio::test]
    async fn test_duplicate_tool_records_take_last() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let mut stale = record("A", acc(json!(0.5)));
        stale.best_model = "A-stale".to_string();
        let store = vec![stale, record("B", acc(json!(0.6))), record("A", acc(json!(0.7)))];
        std::fs::write(&path, serde_json::to_string_pretty(&store).unwrap()).unwrap();

        let view = ComparisonService::new(Arc::new(ResultsRegistry::new(path)))
            .compare("d.csv", "A")
            .await
            .unwrap();
        assert_eq!(view.selected.unwrap().best_model, "A-model");
        let others: Vec<_> = view.others.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(others, vec!["B"]);
    }
}
