//! Persistence layer for data bundles.
//!
//! A bundle is a single JSON snapshot of the experiment index and every
//! experiment's raw results, so a data directory can be shipped as one file
//! and read back without the original layout.

use crate::error::{DashboardError, Result};
use crate::source::{DataSource, ExperimentEntry, ExperimentIndex, INDEX_FILENAME, RUN_FILENAME};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default filename for a data bundle.
pub const DEFAULT_BUNDLE_FILENAME: &str = "experiments_bundle.json";

/// The experiment index plus raw results keyed by experiment name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub experiments: Vec<ExperimentEntry>,
    pub experiment_results: BTreeMap<String, Value>,
}

impl Bundle {
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| DashboardError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DashboardError::Serialization(format!("{}: {}", path.display(), e)))
}

/// Read a data directory into a bundle.
///
/// Every experiment listed in the index must have a readable `run.json`.
pub fn gather_bundle(root: &Path) -> Result<Bundle> {
    let experiments: Vec<ExperimentEntry> = read_json(&root.join(INDEX_FILENAME))?;

    let mut experiment_results = BTreeMap::new();
    for entry in &experiments {
        let run_path = root.join(entry.folder()).join(RUN_FILENAME);
        let run: Value = read_json(&run_path)?;
        experiment_results.insert(entry.name.clone(), run);
    }

    Ok(Bundle {
        experiments,
        experiment_results,
    })
}

/// Read every indexed experiment of `source` into a bundle.
///
/// The index is checked first, so the bundle can be loaded back as a source.
pub async fn collect_bundle<S: DataSource>(source: &S) -> Result<Bundle> {
    let index = ExperimentIndex::new(source.load_index().await?)?;

    let mut bundle = Bundle::default();
    for entry in index.entries() {
        let run = source.load_run(entry).await?;
        bundle.experiment_results.insert(entry.name.clone(), run);
        bundle.experiments.push(entry.clone());
    }

    Ok(bundle)
}

/// Save a bundle to a file.
pub fn save_bundle(bundle: &Bundle, path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| DashboardError::io(parent, e))?;
        }
    }

    let data = serde_json::to_string_pretty(bundle)
        .map_err(|e| DashboardError::Serialization(e.to_string()))?;

    fs::write(path, data).map_err(|e| DashboardError::io(path, e))?;

    Ok(())
}

/// Load a bundle from a file.
pub fn load_bundle(path: &Path) -> Result<Bundle> {
    if !bundle_exists(path) {
        return Err(DashboardError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "bundle file not found"),
        ));
    }
    read_json(path)
}

/// Check if a bundle file exists at the given path.
pub fn bundle_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get the size of a bundle file in bytes.
pub fn bundle_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| DashboardError::io(path, e))?;
    Ok(metadata.len())
}
