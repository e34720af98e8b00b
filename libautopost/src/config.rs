//! Configuration management for Autopost

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Publisher per platform name
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" => Ok(StorageBackend::Json),
            other => Err(ConfigError::InvalidValue {
                field: "storage.backend".to_string(),
                reason: format!("'{}' is not one of: sqlite, json", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> String {
    "~/.local/share/autopost/posts.db".to_string()
}

/// How the retry budget is counted across the platforms of one post
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryBudget {
    /// One counter (`Post::attempts`) bounds every platform of the post
    #[default]
    Shared,
    /// Each platform gets its own budget within a dispatch
    PerPlatform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    #[serde(default)]
    pub retry_budget: RetryBudget,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retry_budget: RetryBudget::Shared,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    60
}

/// External program that publishes a post to one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_image_endpoint")]
    pub image_endpoint: String,
    #[serde(default = "default_image_api_key_env")]
    pub image_api_key_env: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            image_endpoint: default_image_endpoint(),
            image_api_key_env: default_image_api_key_env(),
        }
    }
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_image_endpoint() -> String {
    "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image".to_string()
}

fn default_image_api_key_env() -> String {
    "IMAGE_GEN_API_KEY".to_string()
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing config file is not an error: the defaults are used. The
    /// `AUTOPOST_STORAGE` and `AUTOPOST_DB_PATH` overrides are applied last.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("AUTOPOST_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var("AUTOPOST_DB_PATH") {
            self.storage.path = path;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.scheduler.backoff_multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.backoff_multiplier".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.path".to_string()).into());
        }
        for (name, platform) in &self.platforms {
            if platform.command.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("platforms.{}.command", name)).into());
            }
        }
        Ok(())
    }

    /// Storage path with `~` expanded
    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.path).to_string())
    }
}

/// Resolve the configuration file path (`AUTOPOST_CONFIG`, then the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AUTOPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("autopost").join("config.toml"))
}
