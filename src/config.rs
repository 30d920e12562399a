use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

/// Request bounds applied by the query validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when a request omits `page.limit` or sends 0.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Larger page limits are capped to this value.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Maximum distinct values in any set-valued filter.
    #[serde(default = "default_max_filter_values")]
    pub max_filter_values: usize,

    /// Documents scored between cancellation checks.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

fn default_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    1000
}

fn default_max_filter_values() -> usize {
    100
}

fn default_scan_batch_size() -> usize {
    4096
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_filter_values: default_max_filter_values(),
            scan_batch_size: default_scan_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimension; vectors of any other length are not indexed.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Only load embeddings produced by this model, if set.
    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: u32,
}

fn default_embedding_dim() -> usize {
    128
}

fn default_near_duplicate_threshold() -> u32 {
    50 // Hamming distance threshold for perceptual hash similarity (~20% of 256 bits)
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            embedding_model: None,
            near_duplicate_threshold: default_near_duplicate_threshold(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clepho")
        .join("clepho.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search: SearchConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Config {
    /// Load from `CLEPHO_SEARCH_CONFIG` or the default location, writing a
    /// default config file when none exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clepho")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CLEPHO_SEARCH_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("search.toml")
    }
}
