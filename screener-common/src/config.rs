//! Configuration management for the screener client.
//!
//! The configuration lives at `~/.screener/config.json`. Every field has a
//! default, so a missing file yields a usable configuration.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SCREENER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SCREENER_BASE_URL` → scanner.base_url
//! - `SCREENER_TIMEOUT_SECS` → scanner.timeout_secs
//! - `SCREENER_COOKIE` → scanner.cookie
//! - `SCREENER_LANG` → scanner.lang
//! - `SCREENER_LOG_LEVEL` → observability.log_level
//! - `SCREENER_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".screener"),
        |dirs| dirs.home_dir().join(".screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Scanner Configuration
// ============================================================================

/// Scanner base URL
pub const DEFAULT_BASE_URL: &str = "https://scanner.tradingview.com";

/// Per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Browser-like user agent; the scanner rejects some bare client agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Response language
pub const DEFAULT_LANG: &str = "en";

/// Market a fresh query is scoped to
pub const DEFAULT_MARKET: &str = "america";

/// Settings for talking to the remote scan endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Base URL of the scanner service; endpoints are `{base_url}/{market}/scan`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Raw `Cookie` header value sent with each request (session cookies
    /// unlock real-time data on the remote side).
    #[serde(default)]
    pub cookie: Option<String>,

    /// User agent sent with each request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Language passed in the request `options.lang`
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Market a fresh query is scoped to
    #[serde(default = "default_market")]
    pub default_market: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            cookie: None,
            user_agent: default_user_agent(),
            lang: default_lang(),
            default_market: default_market(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_lang() -> String {
    DEFAULT_LANG.into()
}

fn default_market() -> String {
    DEFAULT_MARKET.into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to force to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the screener client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Scanner endpoint settings
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `SCREENER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are rejected rather than silently ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCREENER_BASE_URL") {
            self.scanner.base_url = url;
        }
        if let Some(secs) = lookup("SCREENER_TIMEOUT_SECS") {
            self.scanner.timeout_secs = secs.trim().parse().map_err(|_| {
                Error::Config(format!("SCREENER_TIMEOUT_SECS is not a number: {secs}"))
            })?;
        }
        if let Some(cookie) = lookup("SCREENER_COOKIE") {
            self.scanner.cookie = Some(cookie);
        }
        if let Some(lang) = lookup("SCREENER_LANG") {
            self.scanner.lang = lang;
        }
        if let Some(level) = lookup("SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SCREENER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        Ok(())
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).context(format!(
                    "Failed to create config directory {}",
                    dir.display()
                ))?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))
    }
}
