//! Configuration for the dashboard.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values, and
//! command-line flags take precedence over both.

use crate::error::{DashboardError, Result};
use crate::metrics::DEFAULT_CACHE_TTL;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where experiment data is read from. Exactly one should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Local directory holding `experiments.json` and the run folders
    pub data_dir: Option<PathBuf>,

    /// Base URL serving `mlflow_results/` (e.g., "http://localhost:8080")
    pub base_url: Option<String>,

    /// Bundle file written by `exp-dash bundle`
    pub bundle: Option<PathBuf>,
}

/// Metrics aggregation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Lifetime of cached metrics, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub metrics: MetricsConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    data: Option<DataFileSection>,
    metrics: Option<MetricsFileSection>,
}

#[derive(Debug, Deserialize)]
struct DataFileSection {
    data_dir: Option<PathBuf>,
    base_url: Option<String>,
    bundle: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct MetricsFileSection {
    cache_ttl_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EXP_DASH_DATA_DIR, EXP_DASH_BASE_URL, EXP_DASH_BUNDLE,
    ///    EXP_DASH_CACHE_TTL_SECS)
    /// 2. Config file (~/.config/exp-dash/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Override values from an environment lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = var("EXP_DASH_DATA_DIR") {
            self.data.data_dir = Some(PathBuf::from(data_dir));
        }

        if let Some(base_url) = var("EXP_DASH_BASE_URL") {
            self.data.base_url = Some(base_url);
        }

        if let Some(bundle) = var("EXP_DASH_BUNDLE") {
            self.data.bundle = Some(PathBuf::from(bundle));
        }

        if let Some(ttl) = var("EXP_DASH_CACHE_TTL_SECS") {
            match ttl.parse() {
                Ok(secs) => self.metrics.cache_ttl_secs = secs,
                Err(_) => tracing::warn!(value = %ttl, "ignoring invalid EXP_DASH_CACHE_TTL_SECS"),
            }
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DashboardError::io(path, e))?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| DashboardError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(data) = file_config.data {
            config.data.data_dir = data.data_dir;
            config.data.base_url = data.base_url;
            config.data.bundle = data.bundle;
        }
        if let Some(ttl) = file_config.metrics.and_then(|m| m.cache_ttl_secs) {
            config.metrics.cache_ttl_secs = ttl;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "exp-dash")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Apply command-line overrides. A flag replaces every configured source.
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        base_url: Option<String>,
        bundle: Option<PathBuf>,
    ) -> Self {
        if data_dir.is_some() || base_url.is_some() || bundle.is_some() {
            self.data = DataConfig {
                data_dir,
                base_url,
                bundle,
            };
        }
        self
    }

    /// Validate that exactly one data source is configured.
    pub fn validate(&self) -> Result<()> {
        let configured = [
            self.data.data_dir.is_some(),
            self.data.base_url.is_some(),
            self.data.bundle.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        match configured {
            0 => Err(DashboardError::Config(
                "A data source is required. Pass --data-dir, --url or --bundle, set EXP_DASH_DATA_DIR, EXP_DASH_BASE_URL or EXP_DASH_BUNDLE, or add one to the config file.".to_string(),
            )),
            1 => Ok(()),
            _ => Err(DashboardError::Config(
                "Only one data source may be configured at a time.".to_string(),
            )),
        }
    }

    /// Lifetime of cached metrics.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics.cache_ttl_secs)
    }

    /// Create a config reading from a local directory (useful for testing).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data: DataConfig {
                data_dir: Some(data_dir.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
