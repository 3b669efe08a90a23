//! Corpus configuration
//!
//! Loaded from TOML. Everything that used to be a process-wide constant (API
//! location, data folder, pacing) lives here and is handed to the orchestrator.

use crate::error::{CorpusError, Result};
use crate::rate_limit::dispatch_interval;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorpusConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub corpus: LayoutConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
}

/// Remote API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_queries_per_second")]
    pub queries_per_second: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            queries_per_second: default_queries_per_second(),
            timeout_secs: default_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.xeno-canto.org/api/2".to_string()
}
fn default_queries_per_second() -> f64 {
    1.0
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_response_bytes() -> usize {
    256 * 1024 * 1024
}

/// Data folder and download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_recordings")]
    pub max_recordings: usize,
    #[serde(default = "default_long_extension")]
    pub long_extension: String,
    #[serde(default = "default_true")]
    pub download: bool,
    #[serde(default = "default_true")]
    pub convert: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_recordings: default_max_recordings(),
            long_extension: default_long_extension(),
            download: true,
            convert: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_max_recordings() -> usize {
    50
}
fn default_long_extension() -> String {
    "mp3".to_string()
}
fn default_true() -> bool {
    true
}

/// Extraction settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConvertConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
    /// Worker threads; 0 means one per CPU
    #[serde(default)]
    pub workers: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            workers: 0,
        }
    }
}

fn default_window_seconds() -> f64 {
    2.0
}

/// A named group of recordings and the API query selecting them
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Category {
    pub name: String,
    pub query: String,
}

impl Category {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new("great_tit", "parus major type:song q:A"),
        Category::new("blue_tit", "cyanistes caeruleus type:song q:A"),
    ]
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            corpus: LayoutConfig::default(),
            convert: ConvertConfig::default(),
            categories: default_categories(),
        }
    }
}

impl CorpusConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?;
        let config: CorpusConfig = toml::from_str(&content)
            .map_err(|e| CorpusError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        dispatch_interval(self.api.queries_per_second)?;
        if !self.convert.window_seconds.is_finite() || self.convert.window_seconds <= 0.0 {
            return Err(CorpusError::Config(format!(
                "window_seconds must be > 0, got {}",
                self.convert.window_seconds
            )));
        }
        if self.corpus.long_extension.is_empty()
            || !self.corpus.long_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CorpusError::Config(format!(
                "long_extension {:?} must be alphanumeric",
                self.corpus.long_extension
            )));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if !is_safe_name(&category.name) {
                return Err(CorpusError::Config(format!(
                    "category name {:?} must be non-empty and use only letters, digits, '-' or '_'",
                    category.name
                )));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(CorpusError::Config(format!(
                    "category {:?} is listed twice",
                    category.name
                )));
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api.base_url)
            .map_err(|e| CorpusError::Config(format!("base_url {:?}: {}", self.api.base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(CorpusError::Config(format!(
                "base_url {:?} cannot be a base URL",
                self.api.base_url
            )));
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
