//! Configuration loading for odoo-rpc clients.
//!
//! Configuration is loaded from a TOML file or built programmatically.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for an [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Default request context (lang, tz, ...) used until login replaces it.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Sync engine defaults.
    #[serde(default)]
    pub sync: SyncSettings,
    /// Long-polling configuration.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Base URL prefixed to every RPC path (default: empty, paths are used as-is).
    #[serde(default)]
    pub base_url: String,
    /// Bearer credential sent in the `Authorization` header (optional).
    #[serde(default)]
    pub authorization: Option<String>,
}

/// Sync engine defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Delay between settled ticks in milliseconds (default: 5000).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Records per page (default: 50).
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Pages drained in one tick before yielding (default: 100).
    #[serde(default = "default_max_pages_per_tick")]
    pub max_pages_per_tick: u32,
}

/// Long-polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Bus channels to listen on.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

// Default value functions
fn default_tick_interval_ms() -> u64 {
    5000
}

fn default_page_limit() -> u32 {
    50
}

fn default_max_pages_per_tick() -> u32 {
    100
}

fn default_channels() -> Vec<String> {
    vec!["notify_warning_1".to_string(), "notify_info_1".to_string()]
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            page_limit: default_page_limit(),
            max_pages_per_tick: default_max_pages_per_tick(),
        }
    }
}

impl SyncSettings {
    /// Tick interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for a server base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            server: ServerConfig {
                base_url: base_url.to_string(),
                authorization: None,
            },
            ..Self::default()
        }
    }

    /// Set the bearer credential.
    pub fn with_authorization(mut self, credential: &str) -> Self {
        self.server.authorization = Some(credential.to_string());
        self
    }

    /// Add a default context entry.
    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Set the sync engine defaults.
    pub fn with_sync(mut self, sync: SyncSettings) -> Self {
        self.sync = sync;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
