//! Configuration loading and management
//!
//! Handles parsing of `worklog.toml` and locating the per-user config
//! directory that also holds `settings.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the config directory.
pub const HOME_ENV: &str = "WORKLOG_HOME";

pub const CONFIG_FILE: &str = "worklog.toml";
pub const SETTINGS_FILE: &str = "settings.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Log collection settings
    #[serde(default)]
    pub collect: CollectConfig,

    /// Chat-completion settings for reports
    #[serde(default)]
    pub ai: AiConfig,
}

/// Collection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Concurrent git invocations; unset means available parallelism
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: Option<usize>,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,

    /// Git executable to run
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

fn default_max_concurrency() -> Option<usize> {
    Some(4)
}

fn default_git_timeout_secs() -> u64 {
    60
}

fn default_git_binary() -> String {
    "git".to_string()
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            git_timeout_secs: default_git_timeout_secs(),
            git_binary: default_git_binary(),
        }
    }
}

impl CollectConfig {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == Some(0) {
            return Err(Error::InvalidConfig(
                "collect.max_concurrency must be >= 1".to_string(),
            ));
        }
        if self.git_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "collect.git_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.git_binary.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "collect.git_binary cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// AI-related configuration. The API key lives in the settings store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    /// System prompt for summaries
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    60
}

pub fn default_prompt() -> String {
    "You are an assistant that writes work reports. Summarize the following git \
     commit history into a concise report grouped by project, highlighting \
     completed work and notable changes."
        .to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_ai_timeout_secs(),
            prompt: default_prompt(),
        }
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if !base_url.is_empty()
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(Error::InvalidConfig(format!(
                "ai.base_url must start with http:// or https:// (got '{base_url}')"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "ai.timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise defaults. Parse errors propagate.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        crate::lock::write_atomic(path, content.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        self.collect.validate()?;
        self.ai.validate()?;
        Ok(())
    }
}

/// Directory holding `worklog.toml` and `settings.json`.
///
/// `WORKLOG_HOME` wins; otherwise the platform config directory.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    ProjectDirs::from("", "", "worklog")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| {
            Error::InvalidConfig(format!(
                "cannot determine a config directory; set {HOME_ENV}"
            ))
        })
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}
