use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::RetryPolicy;
use crate::error::{AppError, Result};

pub const APP_NAME: &str = "docsync";
#[allow(dead_code)]
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATABASE_FILE_NAME: &str = "index.db";
/// Environment variable that relocates the config directory (tests, containers)
pub const CONFIG_DIR_ENV: &str = "DOCSYNC_CONFIG_DIR";

/// Keys accepted by [`Config::get`] and [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "root_folder_id",
    "drive_api_url",
    "drive_token_env",
    "embedding_provider",
    "embedding_model",
    "embedding_api_url",
    "embedding_api_key_env",
    "chunk_size",
    "chunk_stride",
    "max_retries",
    "retry_base_delay_ms",
    "retry_multiplier",
    "embed_concurrency",
    "max_file_size_mb",
    "request_timeout_secs",
    "search_limit",
    "sync_interval_secs",
    "mirror_dir",
    "color_enabled",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote folder whose descendants are indexed
    pub root_folder_id: String,
    /// Base URL of the Drive v3 compatible file store
    pub drive_api_url: String,
    /// Environment variable holding the file store bearer token
    pub drive_token_env: String,
    /// Embedding provider: "openai", "gemini" or "local"
    pub embedding_provider: String,
    /// Embedding model name
    pub embedding_model: String,
    /// Base URL override for the embedding provider
    pub embedding_api_url: Option<String>,
    /// Environment variable holding the embedding API key
    pub embedding_api_key_env: String,
    /// Chunk window size in characters
    pub chunk_size: usize,
    /// Distance between chunk starts in characters (<= `chunk_size`)
    pub chunk_stride: usize,
    /// Retries after the first attempt for transient network failures
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_base_delay_ms: u64,
    /// Delay growth factor per retry
    pub retry_multiplier: u32,
    /// Concurrent embedding calls per file
    pub embed_concurrency: usize,
    /// Files larger than this are recorded as omitted
    pub max_file_size_mb: u32,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Default number of search results
    pub search_limit: usize,
    /// Interval between background syncs in watch mode
    pub sync_interval_secs: u64,
    /// Directory used as durable mirror of the index database
    pub mirror_dir: Option<PathBuf>,
    /// Enable colored output
    pub color_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_folder_id: String::new(),
            drive_api_url: String::from("https://www.googleapis.com/drive/v3"),
            drive_token_env: String::from("DOCSYNC_DRIVE_TOKEN"),
            embedding_provider: String::from("openai"),
            embedding_model: String::from("text-embedding-3-small"),
            embedding_api_url: None,
            embedding_api_key_env: String::from("OPENAI_API_KEY"),
            chunk_size: 1000,
            chunk_stride: 800,
            max_retries: 5,
            retry_base_delay_ms: 500,
            retry_multiplier: 2,
            embed_concurrency: 4,
            max_file_size_mb: 50,
            request_timeout_secs: 60,
            search_limit: 3,
            sync_interval_secs: 300,
            mirror_dir: None,
            color_enabled: true,
        }
    }
}

impl Config {
    /// Get the configuration directory path for the current OS
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or_else(|| AppError::Config("Could not determine config directory".into()))
    }

    /// Get the path to the config file
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the index database
    pub fn database_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(DATABASE_FILE_NAME))
    }

    /// Load configuration from file, creating defaults if needed
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir()?;
        let config_path = Self::config_file_path()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(config_path, content)?;
        Ok(())
    }

    /// Reject settings the sync engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be greater than 0".into()));
        }
        if self.chunk_stride == 0 || self.chunk_stride > self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_stride must be between 1 and chunk_size ({})",
                self.chunk_size
            )));
        }
        if self.embed_concurrency == 0 {
            return Err(AppError::Config(
                "embed_concurrency must be greater than 0".into(),
            ));
        }
        if self.retry_multiplier == 0 {
            return Err(AppError::Config(
                "retry_multiplier must be greater than 0".into(),
            ));
        }
        url::Url::parse(&self.drive_api_url)
            .map_err(|e| AppError::Config(format!("Invalid drive_api_url: {e}")))?;
        if let Some(api_url) = &self.embedding_api_url {
            url::Url::parse(api_url)
                .map_err(|e| AppError::Config(format!("Invalid embedding_api_url: {e}")))?;
        }
        Ok(())
    }

    /// String form of a single key; unset optional keys are empty
    pub fn get(&self, key: &str) -> Result<String> {
        if !CONFIG_KEYS.contains(&key) {
            return Err(AppError::Config(format!("Unknown config key: {key}")));
        }
        let table = toml::Value::try_from(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {e}")))?;
        Ok(match table.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    /// Set a single key from its string form (used by the `config` command)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid value for {key}: {value}")))
        }

        match key {
            "root_folder_id" => self.root_folder_id = value.to_string(),
            "drive_api_url" => self.drive_api_url = value.to_string(),
            "drive_token_env" => self.drive_token_env = value.to_string(),
            "embedding_provider" => {
                if !["openai", "gemini", "local"].contains(&value) {
                    return Err(AppError::Config(
                        "Invalid provider. Must be: openai, gemini, or local".into(),
                    ));
                }
                self.embedding_provider = value.to_string();
            }
            "embedding_model" => self.embedding_model = value.to_string(),
            "embedding_api_url" => {
                self.embedding_api_url = (!value.is_empty()).then(|| value.to_string());
            }
            "embedding_api_key_env" => self.embedding_api_key_env = value.to_string(),
            "chunk_size" => self.chunk_size = parse(key, value)?,
            "chunk_stride" => self.chunk_stride = parse(key, value)?,
            "max_retries" => self.max_retries = parse(key, value)?,
            "retry_base_delay_ms" => self.retry_base_delay_ms = parse(key, value)?,
            "retry_multiplier" => self.retry_multiplier = parse(key, value)?,
            "embed_concurrency" => self.embed_concurrency = parse(key, value)?,
            "max_file_size_mb" => self.max_file_size_mb = parse(key, value)?,
            "request_timeout_secs" => self.request_timeout_secs = parse(key, value)?,
            "search_limit" => self.search_limit = parse(key, value)?,
            "sync_interval_secs" => self.sync_interval_secs = parse(key, value)?,
            "mirror_dir" => {
                self.mirror_dir = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "color_enabled" => self.color_enabled = parse(key, value)?,
            _ => return Err(AppError::Config(format!("Unknown config key: {key}"))),
        }
        self.validate()
    }

    /// Maximum file size in bytes
    #[must_use]
    pub fn max_file_size_bytes(&self) -> u64 {
        u64::from(self.max_file_size_mb) * 1024 * 1024
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
