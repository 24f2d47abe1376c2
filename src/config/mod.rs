//! Configuration management for the Things5 intent engine

use crate::error::{Result, Things5Error};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, path::PathBuf, time::Duration};
use url::Url;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Things5 platform API configuration
    pub things5: Things5Config,

    /// Intent resolution tuning
    #[serde(default)]
    pub intent: IntentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Things5 platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Things5Config {
    /// API base URL (e.g., "https://api.example.com/v1")
    pub base_url: Url,

    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub timeout: Duration,

    /// Devices requested per inventory page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound on followed pagination cursors
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Bearer tokens whose organization is remembered
    #[serde(default = "default_organization_cache_size")]
    pub organization_cache_size: usize,
}

/// Intent resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// How long an inventory snapshot is served without refetching
    #[serde(with = "humantime_serde", default = "default_inventory_ttl")]
    pub inventory_ttl: Duration,

    /// Bound on any single inventory or capability fetch
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// Cap applied to every suggestion list
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Capability fetches in flight per composition
    #[serde(default = "default_capability_concurrency")]
    pub capability_concurrency: usize,

    /// Optional TOML file replacing the built-in hint tables
    #[serde(default)]
    pub hint_tables: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Log to file (path)
    pub file: Option<String>,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    20
}

fn default_organization_cache_size() -> usize {
    256
}

fn default_inventory_ttl() -> Duration {
    Duration::from_secs(120)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_suggestions() -> usize {
    10
}

fn default_capability_concurrency() -> usize {
    4
}

impl Things5Config {
    /// Create a config for the given API base with default tuning
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: default_request_timeout(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            organization_cache_size: default_organization_cache_size(),
        }
    }
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            inventory_ttl: default_inventory_ttl(),
            fetch_timeout: default_fetch_timeout(),
            max_suggestions: default_max_suggestions(),
            capability_concurrency: default_capability_concurrency(),
            hint_tables: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: None,
        }
    }
}

fn parse_duration_var(name: &str, value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| Things5Error::config(format!("Invalid {}: {}", name, e)))
}

fn parse_usize_var(name: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|e| Things5Error::config(format!("Invalid {}: {}", name, e)))
}

impl ServerConfig {
    /// Create a configuration with defaults for everything but the API base
    pub fn new(base_url: Url) -> Self {
        Self {
            things5: Things5Config::new(base_url),
            intent: IntentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("THINGS5_BASE_URL")
            .map_err(|_| Things5Error::config("THINGS5_BASE_URL is not set"))?;
        let base_url = base_url
            .parse()
            .map_err(|e| Things5Error::config(format!("Invalid THINGS5_BASE_URL: {}", e)))?;

        let mut config = Self::new(base_url);

        if let Ok(timeout) = env::var("THINGS5_TIMEOUT") {
            config.things5.timeout = parse_duration_var("THINGS5_TIMEOUT", &timeout)?;
        }

        if let Ok(page_size) = env::var("THINGS5_PAGE_SIZE") {
            config.things5.page_size = parse_usize_var("THINGS5_PAGE_SIZE", &page_size)?;
        }

        if let Ok(size) = env::var("THINGS5_ORGANIZATION_CACHE_SIZE") {
            config.things5.organization_cache_size =
                parse_usize_var("THINGS5_ORGANIZATION_CACHE_SIZE", &size)?;
        }

        if let Ok(ttl) = env::var("THINGS5_INVENTORY_TTL") {
            config.intent.inventory_ttl = parse_duration_var("THINGS5_INVENTORY_TTL", &ttl)?;
        }

        if let Ok(timeout) = env::var("THINGS5_FETCH_TIMEOUT") {
            config.intent.fetch_timeout = parse_duration_var("THINGS5_FETCH_TIMEOUT", &timeout)?;
        }

        if let Ok(max) = env::var("THINGS5_MAX_SUGGESTIONS") {
            config.intent.max_suggestions = parse_usize_var("THINGS5_MAX_SUGGESTIONS", &max)?;
        }

        if let Ok(path) = env::var("THINGS5_HINT_TABLES") {
            config.intent.hint_tables = Some(PathBuf::from(path));
        }

        // Load logging configuration
        if let Ok(level) = env::var("RUST_LOG") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.things5.base_url;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Things5Error::config("Base URL must use http or https scheme"));
        }

        if self.things5.timeout.is_zero() {
            return Err(Things5Error::config("Timeout must be greater than zero"));
        }

        if self.things5.page_size == 0 || self.things5.max_pages == 0 {
            return Err(Things5Error::config(
                "Page size and page limit must be greater than zero",
            ));
        }

        if self.things5.organization_cache_size == 0 {
            return Err(Things5Error::config(
                "organization_cache_size must be at least 1",
            ));
        }

        if self.intent.fetch_timeout.is_zero() {
            return Err(Things5Error::config("Fetch timeout must be greater than zero"));
        }

        if self.intent.max_suggestions == 0 {
            return Err(Things5Error::config("max_suggestions must be at least 1"));
        }

        if self.intent.capability_concurrency == 0 {
            return Err(Things5Error::config(
                "capability_concurrency must be at least 1",
            ));
        }

        Ok(())
    }
}
