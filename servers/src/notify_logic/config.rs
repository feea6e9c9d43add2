use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use lib_realtime::configs::{ConfigLayer, RealtimeConfig};
use lib_realtime::core::UserRole;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 9010;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Expert marketplace notification relay and client", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NOTIFY_PORT", help = "Port the relay listens on.")]
    pub port: Option<u16>,

    #[clap(long, env = "NOTIFY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NOTIFY_WS_URL", help = "Event-stream endpoint (ws:// or wss://).")]
    pub ws_url: Option<String>,

    #[clap(long, env = "NOTIFY_API_BASE_URL", help = "Base URL of the REST service backing paged lists.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "NOTIFY_PAGE_SIZE", help = "Items requested per page.")]
    pub page_size: Option<u32>,

    #[clap(long, env = "NOTIFY_BUFFER_CAPACITY", help = "Notifications kept in memory.")]
    pub notification_capacity: Option<usize>,

    #[clap(long, env = "NOTIFY_HTTP_MAX_RETRIES", help = "Transport retries for page fetches.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "NOTIFY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NOTIFY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NOTIFY_USER_ID", help = "User the client authenticates as.")]
    pub user_id: Option<String>,

    #[clap(long, env = "NOTIFY_USER_TYPE", help = "Account kind: expert or institution.")]
    pub user_type: Option<UserRole>,

    #[clap(long, env = "NOTIFY_LIST_PATH", help = "REST path of a paged list to preload (e.g. projects).")]
    pub list_path: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            ws_url: other.ws_url.or(self.ws_url),
            api_base_url: other.api_base_url.or(self.api_base_url),
            page_size: other.page_size.or(self.page_size),
            notification_capacity: other.notification_capacity.or(self.notification_capacity),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            user_id: other.user_id.or(self.user_id),
            user_type: other.user_type.or(self.user_type),
            list_path: other.list_path.or(self.list_path),
        }
    }

    fn realtime_layer(&self) -> ConfigLayer {
        ConfigLayer {
            ws_url: self.ws_url.clone(),
            api_base_url: self.api_base_url.clone(),
            page_size: self.page_size,
            notification_capacity: self.notification_capacity,
            http_max_retries: self.http_max_retries,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

/// Resolved settings for the binaries.
#[derive(Debug, Clone)]
pub struct Settings {
    pub realtime: RealtimeConfig,
    pub port: u16,
    pub user_id: String,
    pub user_type: UserRole,
    pub list_path: Option<String>,
}

/// Defaults, then the JSON config file, then environment and CLI.
pub fn load_config(default_file: &str) -> anyhow::Result<Settings> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    resolve(Config::parse(), default_file)
}

fn resolve(cli: Config, default_file: &str) -> anyhow::Result<Settings> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_file));

    let mut current = Config::default();
    if let Some(file_config) = read_config_file(&config_file_path)? {
        current = current.merge(file_config);
    }
    current = current.merge(cli);

    let realtime = RealtimeConfig::resolve(current.realtime_layer())?;
    Ok(Settings {
        realtime,
        port: current.port.unwrap_or(DEFAULT_PORT),
        user_id: current.user_id.unwrap_or_else(|| "demo-expert".to_string()),
        user_type: current.user_type.unwrap_or(UserRole::Expert),
        list_path: current.list_path,
    })
}

fn read_config_file(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str::<Config>(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_values_override_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"port": 7000, "wsUrl": "ws://relay.local/ws", "userType": "institution", "pageSize": 25}}"#
        )
        .unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(7100),
            ..Default::default()
        };
        let settings = resolve(cli, "unused.conf").unwrap();

        assert_eq!(settings.port, 7100);
        assert_eq!(settings.user_type, UserRole::Institution);
        assert_eq!(settings.realtime.ws_url, "ws://relay.local/ws");
        assert_eq!(settings.realtime.page_size, 25);
        assert_eq!(settings.realtime.notification_capacity, 50);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.conf");
        let settings = resolve(Config::default(), absent.to_str().unwrap()).unwrap();

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.user_type, UserRole::Expert);
        assert!(settings.list_path.is_none());
    }

    #[test]
    fn invalid_endpoint_is_reported() {
        let cli = Config {
            ws_url: Some("http://not-a-socket".into()),
            config_path: Some(PathBuf::from("/nonexistent/notify.conf")),
            ..Default::default()
        };
        assert!(resolve(cli, "unused.conf").is_err());
    }
}
