//! Results registry.
//!
//! This module provides:
//! - A durable JSON store of completed run records
//! - Replace-by-key saves, keyed on `(dataset, tool)`
//! - Full and per-dataset reads for the comparison service
//!
//! Writes serialize through an async mutex and replace the store file
//! atomically, so unlocked readers always see a complete file.

pub mod record;

pub use record::{LeaderboardEntry, Metrics, RunRecord};

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::metrics::MetricsCollector;

/// Best-model id stored when a record names none and has no leaderboard.
pub const UNKNOWN_MODEL: &str = "UNKNOWN_MODEL";

/// File-backed store of [`RunRecord`]s.
///
/// Construct once and share behind an `Arc`.
#[derive(Debug)]
pub struct ResultsRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
    metrics: MetricsCollector,
}

impl ResultsRegistry {
    /// Create a registry backed by the JSON file at `path`.
    ///
    /// The file and its directory are created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every stored record, in file order.
    ///
    /// A missing or empty store file yields an empty list.
    pub async fn load(&self) -> Result<Vec<RunRecord>, RegistryError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| RegistryError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save a record, replacing any record with the same `(dataset, tool)`.
    ///
    /// An empty `best_model` is filled from the first leaderboard entry, or
    /// with [`UNKNOWN_MODEL`] when the leaderboard is empty. Returns the record
    /// as stored.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or the new file cannot be
    /// written. On error the previous file is left intact.
    pub async fn save(&self, mut record: RunRecord) -> Result<RunRecord, RegistryError> {
        if record.best_model.trim().is_empty() {
            record.best_model = record
                .leaderboard
                .first()
                .map(|entry| entry.model_id.clone())
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string());
        }

        let _guard = self.write_lock.lock().await;
        let result = self.replace_and_write(&record).await;
        self.metrics.record_registry_write(result.is_ok());
        let replaced = result?;

        info!(
            dataset = %record.dataset,
            tool = %record.tool,
            best_model = %record.best_model,
            replaced,
            "Saved run record"
        );
        Ok(record)
    }

    async fn replace_and_write(&self, record: &RunRecord) -> Result<bool, RegistryError> {
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| !r.has_key(&record.dataset, &record.tool));
        let replaced = records.len() != before;
        records.push(record.clone());

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &records)).await??;
        Ok(replaced)
    }

    /// Records for one dataset, in file order.
    pub async fn records_for_dataset(&self, dataset: &str) -> Result<Vec<RunRecord>, RegistryError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.dataset == dataset)
            .collect())
    }

    /// The record for `(dataset, tool)`, if any.
    pub async fn get(&self, dataset: &str, tool: &str) -> Result<Option<RunRecord>, RegistryError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.has_key(dataset, tool)))
    }
}

/// Writes the records to a temporary file beside `path`, syncs it, and renames
/// it over `path`.
fn write_atomic(path: &Path, records: &[RunRecord]) -> Result<(), RegistryError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, records)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    debug!(path = %path.display(), records = records.len(), "Registry file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TaskKind;
    use crate::monitor::ResourceSample;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(dataset: &str, tool: &str, accuracy: f64) -> RunRecord {
        RunRecord {
            dataset: dataset.to_string(),
            tool: tool.to_string(),
            task: TaskKind::Classification,
            best_model: String::new(),
            metrics: Metrics::from([("accuracy".to_string(), json!(accuracy))]),
            system: ResourceSample::default(),
            leaderboard: vec![LeaderboardEntry {
                model_id: format!("{tool}-best"),
                metrics: Metrics::from([("accuracy".to_string(), json!(accuracy))]),
            }],
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = ResultsRegistry::new(dir.path().join("results.json"));
        assert!(registry.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "  \n").unwrap();
        let registry = ResultsRegistry::new(path);
        assert!(registry.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{not json").unwrap();
        let registry = ResultsRegistry::new(path);
        let err = registry.load().await.unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_save_replaces_same_key() {
        let dir = TempDir::new().unwrap();
        let registry = ResultsRegistry::new(dir.path().join("nested").join("results.json"));

        registry.save(record("iris.csv", "flaml", 0.8)).await.unwrap();
        registry.save(record("iris.csv", "tpot", 0.7)).await.unwrap();
        registry.save(record("house.csv", "flaml", 0.6)).await.unwrap();
        registry.save(record("iris.csv", "flaml", 0.9)).await.unwrap();

        let records = registry.load().await.unwrap();
        assert_eq!(records.len(), 3);
        let flaml: Vec<_> = records
            .iter()
            .filter(|r| r.has_key("iris.csv", "flaml"))
            .collect();
        assert_eq!(flaml.len(), 1);
        assert_eq!(flaml[0].metric("accuracy"), Some(0.9));
        // The replacement is appended at the end.
        assert!(records.last().unwrap().has_key("iris.csv", "flaml"));
    }

    #[tokio::test]
    async fn test_save_fills_best_model() {
        let dir = TempDir::new().unwrap();
        let registry = ResultsRegistry::new(dir.path().join("results.json"));

        let stored = registry.save(record("a.csv", "h2o", 0.5)).await.unwrap();
        assert_eq!(stored.best_model, "h2o-best");

        let mut bare = record("a.csv", "tpot", 0.5);
        bare.leaderboard.clear();
        let stored = registry.save(bare).await.unwrap();
        assert_eq!(stored.best_model, UNKNOWN_MODEL);

        let mut named = record("a.csv", "flaml", 0.5);
        named.best_model = "chosen".to_string();
        assert_eq!(registry.save(named).await.unwrap().best_model, "chosen");
    }

    #[tokio::test]
    async fn test_get_and_records_for_dataset() {
        let dir = TempDir::new().unwrap();
        let registry = ResultsRegistry::new(dir.path().join("results.json"));
        registry.save(record("a.csv", "flaml", 0.5)).await.unwrap();
        registry.save(record("b.csv", "flaml", 0.6)).await.unwrap();
        registry.save(record("a.csv", "h2o", 0.7)).await.unwrap();

        let a = registry.records_for_dataset("a.csv").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].tool, "flaml");
        assert_eq!(a[1].tool, "h2o");

        let hit = registry.get("b.csv", "flaml").await.unwrap().unwrap();
        assert_eq!(hit.metric("accuracy"), Some(0.6));
        assert!(registry.get("b.csv", "h2o").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_every_key() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ResultsRegistry::new(dir.path().join("results.json")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .save(record(&format!("d{i}.csv"), "flaml", 0.5))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.load().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_store_is_pretty_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let registry = ResultsRegistry::new(&path);
        registry.save(record("a.csv", "flaml", 0.5)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n"));
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["best_model"], "flaml-best");
        assert_eq!(parsed[0]["leaderboard"][0]["model_id"], "flaml-best");
    }
}
