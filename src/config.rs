//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query service connection and materialization settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub auth_key: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Consecutive failed pages tolerated per event slice
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on concurrent slices during one materialization pass
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Stop span pagination after this many spans
    #[serde(default)]
    pub span_limit: Option<usize>,
}

fn default_host() -> String {
    "https://api.sentenai.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_workers() -> usize {
    16
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            auth_key: String::new(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            max_workers: default_max_workers(),
            span_limit: None,
        }
    }
}

impl ClientConfig {
    /// Builder: set the service host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Builder: set the auth key
    pub fn auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = key.into();
        self
    }

    /// Builder: cap the number of spans fetched
    pub fn span_limit(mut self, limit: usize) -> Self {
        self.span_limit = Some(limit);
        self
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
    "info".to_string()
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

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
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
            dirs::config_dir().map(|p| p.join("flare").join("config.toml")),
            Some(PathBuf::from("/etc/flare/config.toml")),
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

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `FLARE_*` overrides from `lookup`; unparsable numbers are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("FLARE_HOST") {
            self.client.host = host;
        }
        if let Some(key) = lookup("FLARE_AUTH_KEY") {
            self.client.auth_key = key;
        }
        if let Some(secs) = lookup("FLARE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.client.request_timeout_secs = secs;
        }
        if let Some(n) = lookup("FLARE_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.client.max_retries = n;
        }
        if let Some(n) = lookup("FLARE_MAX_WORKERS").and_then(|v| v.parse().ok()) {
            self.client.max_workers = n;
        }

        if let Some(level) = lookup("FLARE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("FLARE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
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
    r#"# Flare Configuration
#
# Environment variables override these settings:
# - FLARE_HOST
# - FLARE_AUTH_KEY
# - FLARE_TIMEOUT_SECS
# - FLARE_MAX_RETRIES
# - FLARE_MAX_WORKERS
# - FLARE_LOG_LEVEL
# - FLARE_LOG_FORMAT

[client]
# Query service URL
host = "https://api.sentenai.com"

# API key sent with every request
auth_key = ""

# Request timeout in seconds
request_timeout_secs = 30

# Consecutive failed event pages tolerated before giving up
max_retries = 3

# Maximum number of spans fetched concurrently
max_workers = 16

# Stop after this many spans (unset = all)
# span_limit = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
