// Configuration File Support
//
// TOML configuration for the quota guard with environment variable overrides.
// Loaded from the XDG config directory: ~/.config/quotaguard/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{DEFAULT_CACHE_KEY_PREFIX, DEFAULT_HISTORY_TTL_SECS, DEFAULT_QUOTES_TTL_SECS};
use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Minute window and monthly budget
    pub limits: RateLimitConfig,

    /// Result cache TTLs
    pub cache: CacheConfig,

    /// Shared store location
    pub storage: StorageConfig,

    /// Market-data API
    pub upstream: UpstreamConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for batch quotes
    pub quotes_ttl_secs: u64,

    /// TTL for historical series
    pub history_ttl_secs: u64,

    /// Prefix for cache keys
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quotes_ttl_secs: DEFAULT_QUOTES_TTL_SECS,
            history_ttl_secs: DEFAULT_HISTORY_TTL_SECS,
            key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
        }
    }
}

/// Shared store configuration
///
/// Without a Redis URL the budget counter and cache live in process memory
/// and are lost on restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`
    pub redis_url: Option<String>,
}

/// Market-data API configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL
    pub base_url: String,

    /// API key sent with every request
    pub api_key: String,

    /// Symbols fetched by the batch quote call
    pub symbols: Vec<String>,

    /// Bar interval for historical series
    pub history_interval: String,

    /// Number of bars per historical series
    pub history_output_size: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twelvedata.com".to_string(),
            api_key: String::new(),
            symbols: ["SPY", "DIA", "QQQ", "IWM"].iter().map(|s| s.to_string()).collect(),
            history_interval: "1day".to_string(),
            history_output_size: 30,
            timeout_secs: 10,
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("symbols", &self.symbols)
            .field("history_interval", &self.history_interval)
            .field("history_output_size", &self.history_output_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve metrics
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// A missing file yields the defaults (plus environment overrides).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path
    ///
    /// Returns `~/.config/quotaguard/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "quotaguard", "QuotaGuard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("quotaguard").join("config.toml")
        }
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTAGUARD_LOG_LEVEL, QUOTAGUARD_LOG_FORMAT
    /// - QUOTAGUARD_MAX_PER_MINUTE, QUOTAGUARD_WINDOW_SECS, QUOTAGUARD_MONTHLY_LIMIT,
    ///   QUOTAGUARD_USAGE_KEY_PREFIX
    /// - QUOTAGUARD_REDIS_URL
    /// - QUOTAGUARD_UPSTREAM_URL, TWELVE_DATA_API_KEY
    /// - QUOTAGUARD_METRICS_ENABLED, QUOTAGUARD_METRICS_PORT
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("QUOTAGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUOTAGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.limits = self.limits.apply_env_overrides();

        if let Ok(url) = std::env::var("QUOTAGUARD_REDIS_URL") {
            self.storage.redis_url = Some(url).filter(|u| !u.is_empty());
        }

        if let Ok(url) = std::env::var("QUOTAGUARD_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(key) = std::env::var("TWELVE_DATA_API_KEY") {
            self.upstream.api_key = key;
        }

        if let Ok(enabled) = std::env::var("QUOTAGUARD_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("QUOTAGUARD_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.limits.validate()?;

        if self.cache.quotes_ttl_secs == 0 || self.cache.history_ttl_secs == 0 {
            anyhow::bail!("Cache TTLs must be > 0");
        }

        if self.upstream.symbols.is_empty() {
            anyhow::bail!("At least one quote symbol must be configured");
        }
        if self.upstream.history_output_size == 0 {
            anyhow::bail!("History output size must be > 0");
        }
        reqwest::Url::parse(&self.upstream.base_url)
            .with_context(|| format!("Invalid upstream base URL: {}", self.upstream.base_url))?;

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
