//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//! The network-facing subset is resolved once into a [`ClientConfig`] and
//! handed to every component that talks to the backend.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub feeds: FeedsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Defaults to the API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_event_buffer() -> usize {
    256
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_secs: default_connect_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Where the access token is persisted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Explicit token file; the platform data directory is used otherwise
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

/// Feed view configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    10
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Network settings shared by the HTTP and push clients
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Root of the REST API, without trailing slash and without `/api/v1`
    pub api_base_url: String,
    /// Root of the push endpoint, without trailing slash
    pub push_base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Client settings with both endpoints on the same host and default limits
    pub fn for_base_url(base_url: &str) -> Self {
        let mut config = Config::default();
        config.api.base_url = base_url.to_string();
        config.client()
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("iot-console").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("IOT_CONSOLE_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("IOT_CONSOLE_PUSH_URL") {
            self.push.base_url = Some(url);
        }
        if let Some(path) = lookup("IOT_CONSOLE_TOKEN_PATH") {
            self.session.token_path = Some(PathBuf::from(path));
        }
        if let Some(size) = lookup("IOT_CONSOLE_PAGE_SIZE") {
            match size.parse() {
                Ok(s) if s > 0 => self.feeds.page_size = s,
                _ => tracing::warn!("Ignoring invalid IOT_CONSOLE_PAGE_SIZE: {}", size),
            }
        }
        if let Some(level) = lookup("IOT_CONSOLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("IOT_CONSOLE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Resolve the network settings every client is built from
    pub fn client(&self) -> ClientConfig {
        let api_base_url = normalize_base_url(&self.api.base_url);
        let push_base_url = self
            .push
            .base_url
            .as_deref()
            .map(normalize_base_url)
            .unwrap_or_else(|| api_base_url.clone());

        ClientConfig {
            api_base_url,
            push_base_url,
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.push.connect_timeout_secs),
            max_reconnect_attempts: self.push.max_reconnect_attempts,
            event_buffer: self.push.event_buffer.max(1),
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# IoT Console Configuration
#
# Environment variables override these settings:
# - IOT_CONSOLE_API_URL
# - IOT_CONSOLE_PUSH_URL
# - IOT_CONSOLE_TOKEN_PATH
# - IOT_CONSOLE_PAGE_SIZE
# - IOT_CONSOLE_LOG_LEVEL
# - IOT_CONSOLE_LOG_FORMAT

[api]
# Telemetry API host (the /api/v1 prefix is added automatically)
base_url = "http://localhost:3000"

# Request timeout in seconds
request_timeout_secs = 30

[push]
# Push (Socket.IO) host; defaults to api.base_url
# base_url = "http://localhost:3000"

# WebSocket connect timeout in seconds
connect_timeout_secs = 10

# Reconnect attempts before a live view gives up
max_reconnect_attempts = 5

# Pushed readings buffered per subscription
event_buffer = 256

[session]
# Where the access token is stored (default: platform data directory)
# token_path = "~/.local/share/iot-console/session.json"

[feeds]
# Readings per page in the feed view
page_size = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
