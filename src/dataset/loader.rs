//! Dataset loading from a directory of CSV files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DatasetError;

use super::frame::DataFrame;

/// Resolves a dataset identifier into tabular data.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    /// Loads the dataset named `identifier`.
    ///
    /// Returns [`DatasetError::NotFound`] when the identifier does not resolve.
    async fn load(&self, identifier: &str) -> Result<DataFrame, DatasetError>;
}

/// Summary of a stored dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Loads CSV datasets stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct CsvDatasetLoader {
    root: PathBuf,
}

impl CsvDatasetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an identifier to a file path under the root.
    ///
    /// Identifiers are bare file names; anything that could escape the root
    /// is rejected.
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf, DatasetError> {
        let id = identifier.trim();
        if id.is_empty()
            || id == "."
            || id.contains("..")
            || id.contains('/')
            || id.contains('\\')
        {
            return Err(DatasetError::InvalidIdentifier(identifier.to_string()));
        }
        Ok(self.root.join(id))
    }

    /// Lists the CSV files in the datasets directory, sorted by name.
    pub async fn list(&self) -> Result<Vec<DatasetInfo>, DatasetError> {
        let mut out = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            out.push(DatasetInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Copies a CSV file into the datasets directory and returns its identifier.
    ///
    /// The file is parsed first so that only loadable datasets are stored.
    pub async fn import(&self, source: &Path) -> Result<String, DatasetError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DatasetError::InvalidIdentifier(source.display().to_string()))?;
        let target = self.resolve(&name)?;

        let source_owned = source.to_path_buf();
        let check_name = name.clone();
        tokio::task::spawn_blocking(move || parse_csv(&source_owned, &check_name))
            .await
            .map_err(|e| DatasetError::Io(std::io::Error::other(e.to_string())))??;

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::copy(source, &target).await?;
        info!(dataset = %name, path = %target.display(), "Imported dataset");
        Ok(name)
    }
}

#[async_trait]
impl DatasetLoader for CsvDatasetLoader {
    async fn load(&self, identifier: &str) -> Result<DataFrame, DatasetError> {
        let path = self.resolve(identifier)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DatasetError::NotFound(identifier.to_string()));
        }

        debug!(path = %path.display(), "Loading dataset");
        let name = identifier.to_string();
        let frame = tokio::task::spawn_blocking(move || parse_csv(&path, &name))
            .await
            .map_err(|e| DatasetError::Io(std::io::Error::other(e.to_string())))??;

        info!(
            dataset = identifier,
            rows = frame.n_rows(),
            cols = frame.n_cols(),
            "Dataset loaded"
        );
        Ok(frame)
    }
}

/// Parses a CSV file with a header row into a [`DataFrame`].
pub fn parse_csv(path: &Path, name: &str) -> Result<DataFrame, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(DatasetError::Parse {
            name: name.to_string(),
            message: "missing header row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    if rows.is_empty() {
        return Err(DatasetError::Empty(name.to_string()));
    }

    DataFrame::from_rows(headers, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let loader = CsvDatasetLoader::new("/data");
        assert!(loader.resolve("../etc/passwd").is_err());
        assert!(loader.resolve("a/b.csv").is_err());
        assert!(loader.resolve("  ").is_err());
        assert_eq!(
            loader.resolve("iris.csv").unwrap(),
            PathBuf::from("/data/iris.csv")
        );
    }

    #[tokio::test]
    async fn test_load_csv() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "small.csv", "a,b,label\n1,2,x\n3,,y\n5,6,x\n");

        let loader = CsvDatasetLoader::new(dir.path());
        let frame = loader.load("small.csv").await.unwrap();
        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.column_names(), vec!["a", "b", "label"]);
        assert!(frame.column("b").unwrap().is_missing(1));
        assert!(!frame.column("label").unwrap().is_numeric());
    }

    #[tokio::test]
    async fn test_load_missing_dataset() {
        let dir = TempDir::new().unwrap();
        let loader = CsvDatasetLoader::new(dir.path());
        let err = loader.load("nope.csv").await.unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_header_only_is_empty() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "empty.csv", "a,b\n");
        let loader = CsvDatasetLoader::new(dir.path());
        let err = loader.load("empty.csv").await.unwrap_err();
        assert!(matches!(err, DatasetError::Empty(_)));
    }

    #[tokio::test]
    async fn test_list_and_import() {
        let src = TempDir::new().unwrap();
        let datasets = TempDir::new().unwrap();
        let source = write(src.path(), "house.csv", "rooms,price\n3,100\n4,150\n");
        write(datasets.path(), "notes.txt", "ignored");

        let loader = CsvDatasetLoader::new(datasets.path());
        assert!(loader.list().await.unwrap().is_empty());

        let id = loader.import(&source).await.unwrap();
        assert_eq!(id, "house.csv");

        let listed = loader.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "house.csv");
        assert!(listed[0].size_bytes > 0);
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let loader = CsvDatasetLoader::new("/definitely/not/here");
        assert!(loader.list().await.unwrap().is_empty());
    }
}
