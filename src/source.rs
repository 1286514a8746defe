//! Where experiment data comes from.
//!
//! An experiment index (`experiments.json`) lists every experiment with its
//! version and the folder holding its `run.json`. Three sources are
//! provided: a local directory, an HTTP base URL serving the same layout,
//! and an in-memory [`Bundle`] snapshot for offline use.

use crate::error::{DashboardError, Result};
use crate::persistence::Bundle;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the index file at the root of a data directory.
pub const INDEX_FILENAME: &str = "experiments.json";
/// Name of the results file inside each experiment folder.
pub const RUN_FILENAME: &str = "run.json";
/// Optional free-text description next to the results file.
pub const DESCRIPTION_FILENAME: &str = "description.txt";
/// Path prefix under which an HTTP source serves the data directory.
pub const HTTP_DATA_PREFIX: &str = "mlflow_results";

/// One row of the experiment index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentEntry {
    /// Stable identifier.
    pub name: String,
    #[serde(default, deserialize_with = "crate::types::lenient_text")]
    pub description: String,
    /// 1-based chronological position.
    pub version: u32,
    /// Folder holding the experiment's files, relative to the data root.
    #[serde(default, deserialize_with = "crate::types::lenient_text")]
    pub path: String,
}

impl ExperimentEntry {
    pub fn new(name: impl Into<String>, version: u32, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version,
            path: path.into(),
        }
    }

    /// Folder of the experiment, falling back to its name.
    pub fn folder(&self) -> &str {
        if self.path.is_empty() { &self.name } else { &self.path }
    }
}

/// Version-order table: experiment name to 1-based version.
///
/// Versions are unique and contiguous from 1, so the previous version of
/// any experiment other than the first always exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentIndex {
    /// Sorted by version; entry `i` has version `i + 1`.
    entries: Vec<ExperimentEntry>,
}

impl ExperimentIndex {
    /// Build an index, checking names and version numbering.
    pub fn new(mut entries: Vec<ExperimentEntry>) -> Result<Self> {
        entries.sort_by_key(|e| e.version);

        let mut names = HashSet::new();
        for (position, entry) in entries.iter().enumerate() {
            if !names.insert(entry.name.as_str()) {
                return Err(DashboardError::InvalidIndex(format!(
                    "duplicate experiment name '{}'",
                    entry.name
                )));
            }
            let expected = position as u32 + 1;
            if entry.version != expected {
                return Err(DashboardError::InvalidIndex(format!(
                    "expected version {} but found {} for '{}'",
                    expected, entry.version, entry.name
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ExperimentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExperimentEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn version_of(&self, name: &str) -> Option<u32> {
        self.get(name).map(|e| e.version)
    }

    pub fn by_version(&self, version: u32) -> Option<&ExperimentEntry> {
        let position = version.checked_sub(1)? as usize;
        self.entries.get(position)
    }

    /// The most recent experiment.
    pub fn latest(&self) -> Option<&ExperimentEntry> {
        self.entries.last()
    }
}

/// Provider of the experiment index and raw results.
pub trait DataSource {
    /// Load the rows of the experiment index.
    fn load_index(&self) -> impl Future<Output = Result<Vec<ExperimentEntry>>> + Send;

    /// Load the raw results document of an experiment.
    fn load_run(&self, entry: &ExperimentEntry) -> impl Future<Output = Result<Value>> + Send;

    /// Load the free-text description of an experiment, if any.
    fn load_description(
        &self,
        entry: &ExperimentEntry,
    ) -> impl Future<Output = Option<String>> + Send;

    /// Where the results of `entry` are read from, for display.
    fn data_path(&self, entry: &ExperimentEntry) -> String;
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Experiment data laid out in a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, entry: &ExperimentEntry) -> PathBuf {
        self.root.join(entry.folder()).join(RUN_FILENAME)
    }

    async fn read_json(path: &Path) -> Result<Value> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DashboardError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl DataSource for DirectorySource {
    async fn load_index(&self) -> Result<Vec<ExperimentEntry>> {
        let value = Self::read_json(&self.root.join(INDEX_FILENAME)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn load_run(&self, entry: &ExperimentEntry) -> Result<Value> {
        Self::read_json(&self.run_path(entry)).await
    }

    async fn load_description(&self, entry: &ExperimentEntry) -> Option<String> {
        let path = self.root.join(entry.folder()).join(DESCRIPTION_FILENAME);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => non_empty(text),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no description file");
                None
            }
        }
    }

    fn data_path(&self, entry: &ExperimentEntry) -> String {
        self.run_path(entry).display().to_string()
    }
}

/// Experiment data served over HTTP under `<base>/mlflow_results/`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, relative: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/{}/{}", base, HTTP_DATA_PREFIX, relative)
    }

    fn run_url(&self, entry: &ExperimentEntry) -> String {
        self.url(&format!("{}/{}", entry.folder(), RUN_FILENAME))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::Http(format!("GET {} returned {}", url, status)));
        }
        Ok(response.text().await?)
    }
}

impl DataSource for HttpSource {
    async fn load_index(&self) -> Result<Vec<ExperimentEntry>> {
        let body = self.get_text(&self.url(INDEX_FILENAME)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn load_run(&self, entry: &ExperimentEntry) -> Result<Value> {
        let body = self.get_text(&self.run_url(entry)).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn load_description(&self, entry: &ExperimentEntry) -> Option<String> {
        let url = self.url(&format!("{}/{}", entry.folder(), DESCRIPTION_FILENAME));
        match self.get_text(&url).await {
            Ok(text) => non_empty(text),
            Err(e) => {
                tracing::warn!(experiment = %entry.name, error = %e, "could not load description");
                None
            }
        }
    }

    fn data_path(&self, entry: &ExperimentEntry) -> String {
        self.run_url(entry)
    }
}

/// Experiment data held in memory, keyed by experiment name.
#[derive(Debug, Clone)]
pub struct BundleSource {
    bundle: Bundle,
}

impl BundleSource {
    pub fn new(bundle: Bundle) -> Self {
        Self { bundle }
    }
}

impl DataSource for BundleSource {
    async fn load_index(&self) -> Result<Vec<ExperimentEntry>> {
        Ok(self.bundle.experiments.clone())
    }

    async fn load_run(&self, entry: &ExperimentEntry) -> Result<Value> {
        self.bundle
            .experiment_results
            .get(&entry.name)
            .cloned()
            .ok_or_else(|| DashboardError::load(&entry.name, "not present in bundle"))
    }

    async fn load_description(&self, _entry: &ExperimentEntry) -> Option<String> {
        None
    }

    fn data_path(&self, entry: &ExperimentEntry) -> String {
        format!("bundle:{}", entry.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn entries() -> Vec<ExperimentEntry> {
        vec![
            ExperimentEntry::new("results_perfect_prompts", 2, "2. results_perfect_prompts"),
            ExperimentEntry::new("results_basic_prompts", 1, "1. results_basic_prompts"),
        ]
    }

    #[test]
    fn test_index_orders_by_version() {
        let index = ExperimentIndex::new(entries()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[0].name, "results_basic_prompts");
        assert_eq!(index.version_of("results_perfect_prompts"), Some(2));
        assert_eq!(index.by_version(1).unwrap().name, "results_basic_prompts");
        assert!(index.by_version(0).is_none());
        assert!(index.by_version(3).is_none());
        assert_eq!(index.latest().unwrap().version, 2);
    }

    #[test]
    fn test_index_rejects_gaps_and_duplicates() {
        let gap = vec![ExperimentEntry::new("a", 1, "a"), ExperimentEntry::new("b", 3, "b")];
        assert!(matches!(
            ExperimentIndex::new(gap),
            Err(DashboardError::InvalidIndex(_))
        ));

        let repeated = vec![ExperimentEntry::new("a", 1, "a"), ExperimentEntry::new("b", 1, "b")];
        assert!(ExperimentIndex::new(repeated).is_err());

        let same_name = vec![ExperimentEntry::new("a", 1, "a"), ExperimentEntry::new("a", 2, "b")];
        assert!(ExperimentIndex::new(same_name).is_err());

        let zero_based = vec![ExperimentEntry::new("a", 0, "a")];
        assert!(ExperimentIndex::new(zero_based).is_err());
    }

    #[test]
    fn test_entry_folder_falls_back_to_name() {
        let entry: ExperimentEntry =
            serde_json::from_value(json!({"name": "exp", "version": 1})).unwrap();
        assert_eq!(entry.folder(), "exp");
        assert_eq!(entry.description, "");
    }

    #[test]
    fn test_entry_accepts_null_description() {
        let entries: Vec<ExperimentEntry> = serde_json::from_value(json!([
            {"name": "exp", "description": null, "version": 1, "path": null}
        ]))
        .unwrap();
        assert_eq!(entries[0].description, "");
        assert_eq!(entries[0].folder(), "exp");
        assert!(ExperimentIndex::new(entries).is_ok());
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(INDEX_FILENAME),
            r#"[{"name": "exp", "description": "", "version": 1, "path": "1. exp"}]"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("1. exp")).unwrap();
        fs::write(dir.path().join("1. exp").join(RUN_FILENAME), "[]").unwrap();
        fs::write(
            dir.path().join("1. exp").join(DESCRIPTION_FILENAME),
            "  Baseline run\n",
        )
        .unwrap();

        let source = DirectorySource::new(dir.path());
        let index = source.load_index().await.unwrap();
        assert_eq!(index.len(), 1);

        let run = source.load_run(&index[0]).await.unwrap();
        assert_eq!(run, json!([]));
        assert_eq!(
            source.load_description(&index[0]).await.as_deref(),
            Some("Baseline run")
        );
        assert!(source.data_path(&index[0]).ends_with("run.json"));
    }

    #[tokio::test]
    async fn test_directory_source_missing_run() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path());
        let entry = ExperimentEntry::new("missing", 1, "missing");

        let err = source.load_run(&entry).await.unwrap_err();
        assert!(matches!(err, DashboardError::Io { .. }));
        assert!(source.load_description(&entry).await.is_none());
    }

    #[tokio::test]
    async fn test_http_source() {
        let mut server = mockito::Server::new_async().await;
        let index_mock = server
            .mock("GET", "/mlflow_results/experiments.json")
            .with_status(200)
            .with_body(r#"[{"name": "exp", "description": "d", "version": 1, "path": "exp"}]"#)
            .create_async()
            .await;
        let run_mock = server
            .mock("GET", "/mlflow_results/exp/run.json")
            .with_status(200)
            .with_body(r#"[{"prompt": "q", "response": "a", "correctness": 1, "correctness_weighted": 1, "faithfulness": -1}]"#)
            .create_async()
            .await;
        let _description_mock = server
            .mock("GET", "/mlflow_results/exp/description.txt")
            .with_status(404)
            .create_async()
            .await;

        let source = HttpSource::new(format!("{}/", server.url()));
        let index = source.load_index().await.unwrap();
        let run = source.load_run(&index[0]).await.unwrap();

        assert_eq!(run.as_array().unwrap().len(), 1);
        assert!(source.load_description(&index[0]).await.is_none());
        assert_eq!(
            source.data_path(&index[0]),
            format!("{}/mlflow_results/exp/run.json", server.url())
        );

        index_mock.assert_async().await;
        run_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_source_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/mlflow_results/experiments.json")
            .with_status(500)
            .create_async()
            .await;

        let source = HttpSource::new(server.url());
        let err = source.load_index().await.unwrap_err();
        assert!(matches!(err, DashboardError::Http(_)));
    }

    #[tokio::test]
    async fn test_bundle_source() {
        let mut bundle = Bundle::default();
        bundle.experiments.push(ExperimentEntry::new("exp", 1, "exp"));
        bundle.experiment_results.insert("exp".to_string(), json!([]));

        let source = BundleSource::new(bundle);
        let index = source.load_index().await.unwrap();
        assert_eq!(source.load_run(&index[0]).await.unwrap(), json!([]));

        let other = ExperimentEntry::new("other", 2, "other");
        assert!(matches!(
            source.load_run(&other).await,
            Err(DashboardError::LoadFailure { .. })
        ));
    }
}
