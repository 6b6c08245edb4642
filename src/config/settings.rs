//! Configuration settings, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::CacheConfig;
use crate::error::{ConfigError, Result};
use crate::matching::{FuzzyConfig, SemanticConfig};
use crate::runner::RunnerConfig;
use crate::taxonomy::DEFAULT_MAX_NGRAM;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub matching: MatchingConfig,
    pub embedding: EmbeddingConfig,
    pub storage: StorageConfig,
    pub runner: RunnerConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("assay.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("assay/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("matching.fuzzy.threshold", self.matching.fuzzy.threshold),
            ("matching.semantic.threshold", self.matching.semantic.threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                ))
                .into());
            }
        }
        if self.matching.max_ngram == 0 {
            return Err(ConfigError::Invalid("matching.max_ngram must be > 0".to_string()).into());
        }
        if self.runner.workers == 0 {
            return Err(ConfigError::Invalid("runner.workers must be > 0".to_string()).into());
        }
        if self.embedding.provider == EmbeddingProviderKind::Api
            && self.embedding.api.base_url.is_empty()
        {
            return Err(ConfigError::MissingField("embedding.api.base_url".to_string()).into());
        }
        Ok(())
    }

    /// Expand the results directory path.
    pub fn results_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.results_dir).as_ref())
    }
}

/// Matching pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Fuzzy layer settings.
    pub fuzzy: FuzzyConfig,
    /// Semantic layer settings.
    pub semantic: SemanticConfig,
    /// Enable the semantic fallback layer.
    pub semantic_enabled: bool,
    /// Maximum word n-gram length for the taxonomy index.
    pub max_ngram: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy: FuzzyConfig::default(),
            semantic: SemanticConfig::default(),
            semantic_enabled: true,
            max_ngram: DEFAULT_MAX_NGRAM,
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type: "local" or "api".
    pub provider: EmbeddingProviderKind,
    /// Model name for local embeddings.
    pub model: String,
    /// Per-call batch size.
    pub batch_size: usize,
    /// API provider configuration.
    pub api: ApiEmbeddingConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: crate::embedding::DEFAULT_LOCAL_MODEL.to_string(),
            batch_size: 64,
            api: ApiEmbeddingConfig::default(),
        }
    }
}

/// Embedding provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Local,
    Api,
}

/// API embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEmbeddingConfig {
    /// Base URL for the embedding API.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// API key (falls back to the `EMBEDDING_API_KEY` env var).
    pub api_key: Option<String>,
    /// Batch size per request.
    pub batch_size: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Requests-per-second limit (0 = provider default).
    pub requests_per_second: u32,
}

impl Default for ApiEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            batch_size: 100,
            timeout_secs: 30,
            requests_per_second: 0,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for result files when the CLI does not receive an
    /// explicit output path.
    pub results_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: "~/.local/share/assay".to_string(),
        }
    }
}
