
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::embeddings::MAX_EMBED_BATCH_SIZE;
use crate::history::DEFAULT_MAX_HISTORY_TOKENS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Upstream OpenAI-compatible provider settings. API keys are not stored
/// here; they arrive with each request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embed_batch_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embed_batch_size: MAX_EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_history_tokens: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_tokens: DEFAULT_MAX_HISTORY_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            permissive_cors: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid provider base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embed batch size: {0} (must be between 1 and {MAX_EMBED_BATCH_SIZE})")]
    InvalidEmbedBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {0} (must be smaller than chunk size {1})")]
    InvalidChunkOverlap(usize, usize),
    #[error("Invalid history budget: {0} (must be greater than zero)")]
    InvalidHistoryBudget(usize),
    #[error("Invalid port: {0}")]
    InvalidPort(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                provider: ProviderConfig::default(),
                chunking: ChunkingConfig::default(),
                history: HistoryConfig::default(),
                server: ServerConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;

        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunking.chunk_size));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap(
                self.chunking.chunk_overlap,
                self.chunking.chunk_size,
            ));
        }

        if self.history.max_history_tokens == 0 {
            return Err(ConfigError::InvalidHistoryBudget(
                self.history.max_history_tokens,
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        Ok(())
    }
}

impl ProviderConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.embed_batch_size == 0 || self.embed_batch_size > MAX_EMBED_BATCH_SIZE {
            return Err(ConfigError::InvalidEmbedBatchSize(self.embed_batch_size));
        }

        Ok(())
    }
}

/// Default configuration directory (`~/.config/ragserve` on Linux).
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("ragserve"))
        .ok_or(ConfigError::DirectoryError)
}
