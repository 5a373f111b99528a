//! Configuration loading, validation, and management for SignalSight.
//!
//! Loads configuration from `~/.signalsight/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.signalsight/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fragment cache bounds
    #[serde(default)]
    pub cache: CacheConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Market-data enrichment source
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum live entries before oldest-first eviction
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entry time-to-live in seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Period of the background expiry sweep in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_entries() -> usize {
    100
}
fn default_max_age_secs() -> u64 {
    1800
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How many trailing transcript lines to include
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Upper bound on the assembled payload (estimated tokens)
    #[serde(default = "default_max_payload_tokens")]
    pub max_payload_tokens: usize,

    /// Version tag of the instruction text, part of its cache parameters
    #[serde(default = "default_instruction_version")]
    pub instruction_version: String,

    /// Replace the built-in instruction text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_override: Option<String>,
}

fn default_history_turns() -> usize {
    10
}
fn default_max_payload_tokens() -> usize {
    8000
}
fn default_instruction_version() -> String {
    "v1".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            max_payload_tokens: default_max_payload_tokens(),
            instruction_version: default_instruction_version(),
            instruction_override: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Base URL of the OHLC market-data service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Service API key, used when the caller supplies no auth token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of most recent bars rendered into the snapshot
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_max_bars() -> usize {
    30
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_bars: default_max_bars(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_bars", &self.max_bars)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.signalsight/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SIGNALSIGHT_ENRICHMENT_URL`
    /// - `SIGNALSIGHT_ENRICHMENT_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SIGNALSIGHT_ENRICHMENT_URL") {
            self.enrichment.base_url = Some(url);
        }
        if let Some(key) = lookup("SIGNALSIGHT_ENRICHMENT_KEY") {
            self.enrichment.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".signalsight")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_entries must be > 0".into(),
            ));
        }
        if self.cache.max_age_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_age_secs must be > 0".into(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.context.history_turns == 0 {
            return Err(ConfigError::ValidationError(
                "context.history_turns must be > 0".into(),
            ));
        }
        if self.context.max_payload_tokens < 256 {
            return Err(ConfigError::ValidationError(
                "context.max_payload_tokens must be at least 256".into(),
            ));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "enrichment.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
