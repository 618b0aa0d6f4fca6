//! Workspace configuration (`strata.toml`) and data directory layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the directory holding all strata state.
pub const DATA_DIR_NAME: &str = ".strata";

/// Top-level configuration, parsed from `strata.toml` in the data dir.
///
/// Every field has a default so a missing or partial file still works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub analyze: AnalyzeConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            import: ImportConfig::default(),
            analyze: AnalyzeConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Events per ingest transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeConfig {
    /// Worker threads in the analyzer pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory of signature rule files, relative to the data dir.
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rules_dir: default_rules_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Events fetched per cursor page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

const fn default_batch_size() -> usize {
    500
}

const fn default_workers() -> usize {
    4
}

fn default_rules_dir() -> String {
    "rules".to_string()
}

const fn default_page_size() -> usize {
    200
}

impl StrataConfig {
    /// Load configuration from `<data_dir>/strata.toml`, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("strata.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Write the configuration to `<data_dir>/strata.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join("strata.toml");
        let raw = toml::to_string_pretty(self).context("serialize config")?;
        std::fs::write(&path, raw).with_context(|| format!("write config {}", path.display()))
    }
}

/// Filesystem layout of one strata data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `.strata` under the given workspace directory.
    #[must_use]
    pub fn under(workspace: &Path) -> Self {
        Self::new(workspace.join(DATA_DIR_NAME))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn metadata_db(&self) -> PathBuf {
        self.root.join("metadata.sqlite3")
    }

    #[must_use]
    pub fn events_db(&self) -> PathBuf {
        self.root.join("events.sqlite3")
    }

    #[must_use]
    pub fn rules_dir(&self, config: &StrataConfig) -> PathBuf {
        self.root.join(&config.analyze.rules_dir)
    }

    /// True when the data directory has been initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.metadata_db().exists()
    }
}
