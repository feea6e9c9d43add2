use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of notifications retained by the buffer.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 50;
/// Default page size requested by REST page sources.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// One layer of configuration. Every field is optional so layers can be
/// stacked: defaults, then the JSON file, then environment/CLI values.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    pub ws_url: Option<String>,
    pub api_base_url: Option<String>,
    pub page_size: Option<u32>,
    pub notification_capacity: Option<usize>,
    pub http_max_retries: Option<u32>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigLayer {
    /// Reads a layer from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merges two layers; `Some` values in `other` override `self`.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            ws_url: other.ws_url.or(self.ws_url),
            api_base_url: other.api_base_url.or(self.api_base_url),
            page_size: other.page_size.or(self.page_size),
            notification_capacity: other.notification_capacity.or(self.notification_capacity),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeConfig {
    /// Event-stream endpoint (`ws://` or `wss://`).
    pub ws_url: String,
    /// Base URL of the backing REST service used by page sources.
    pub api_base_url: String,
    pub page_size: u32,
    pub notification_capacity: usize,
    /// Transport-level retries for HTTP page fetches.
    pub http_max_retries: u32,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9010/ws".to_string(),
            api_base_url: "http://127.0.0.1:9011/".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            http_max_retries: 2,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
        }
    }
}

impl RealtimeConfig {
    /// Resolves a layer on top of the defaults and validates the result.
    pub fn resolve(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let defaults = RealtimeConfig::default();
        let config = RealtimeConfig {
            ws_url: layer.ws_url.unwrap_or(defaults.ws_url),
            api_base_url: layer.api_base_url.unwrap_or(defaults.api_base_url),
            page_size: layer.page_size.unwrap_or(defaults.page_size),
            notification_capacity: layer
                .notification_capacity
                .unwrap_or(defaults.notification_capacity),
            http_max_retries: layer.http_max_retries.unwrap_or(defaults.http_max_retries),
            log_dir: layer.log_dir.unwrap_or(defaults.log_dir),
            log_level: layer.log_level.unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads defaults overlaid with the JSON file at `path`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        Self::resolve(ConfigLayer::from_json_file(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                field: "wsUrl",
                reason: format!("expected a ws:// or wss:// URL, got '{}'", self.ws_url),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "pageSize",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "notificationCapacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RealtimeConfig
    Stream endpoint: {},
    API base: {},
    Page size: {},
    Notification capacity: {},
    HTTP retries: {},
    Log dir: {},
    Log level: {}
",
            self.ws_url,
            self.api_base_url,
            self.page_size,
            self.notification_capacity,
            self.http_max_retries,
            self.log_dir.display(),
            self.log_level
        )
    }
}
