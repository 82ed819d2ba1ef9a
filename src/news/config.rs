//! News feed configuration loaded from YAML

use resocket::{ConnectionOptions, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_batch_window_ms() -> u64 {
    300
}

fn default_handshake() -> Option<String> {
    Some("hello".to_string())
}

fn default_max_headlines() -> usize {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_secs() -> u64 {
    300
}

/// News feed binary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed endpoint
    pub url: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub connection: ConnectionOptions,

    /// Quiet period before a batch of headlines is posted
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Sent after every open, ahead of queued sends
    #[serde(default = "default_handshake")]
    pub handshake: Option<String>,

    /// Headlines kept in memory, newest first
    #[serde(default = "default_max_headlines")]
    pub max_headlines: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval of the status heartbeat log line
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl FeedConfig {
    /// Load configuration from YAML file and .env
    ///
    /// `FEED_URL` in the environment overrides the configured url.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;

        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        let mut config = Self::from_yaml(&yaml_content)?;
        if let Ok(url) = std::env::var("FEED_URL") {
            info!("Overriding feed url from environment variable");
            config.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FeedConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }

        if self.batch_window_ms == 0 {
            return Err(ConfigError::ValidationError(
                "batch_window_ms must be positive".to_string(),
            ));
        }

        self.retry
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!("Feed url: {}", self.url);
        info!(
            "Reconnection: {}..{}ms x{}, max retries {:?}, timeout {}ms",
            self.retry.min_reconnection_delay_ms,
            self.retry.max_reconnection_delay_ms,
            self.retry.reconnection_delay_grow_factor,
            self.retry.max_retries,
            self.retry.connection_timeout_ms
        );
        info!(
            "Connection {}: defer {}, halted watch {}, idle reconnect {}",
            self.connection.connection_id,
            self.connection.defer_updates,
            self.connection.watch_for_halted_state,
            self.connection.reconnect_on_idle_state
        );
        info!("Batch window: {}ms", self.batch_window_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_takes_defaults() {
        let config = FeedConfig::from_yaml("url: ws://localhost:8080\n").unwrap();

        assert_eq!(config.batch_window(), Duration::from_millis(300));
        assert_eq!(config.handshake.as_deref(), Some("hello"));
        assert_eq!(config.retry.max_reconnection_delay_ms, 10_000);
        assert!((1000..5000).contains(&config.retry.min_reconnection_delay_ms));
        assert_eq!(config.retry.max_retries, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_nested_sections_override() {
        let yaml = r#"
url: wss://news.example.com/feed
batch_window_ms: 150
handshake: null
retry:
  max_retries: 9
  connection_timeout_ms: 20000
connection:
  connection_id: headlines
  defer_updates: false
  defer_strategy: keeplast
"#;
        let config = FeedConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.batch_window_ms, 150);
        assert_eq!(config.handshake, None);
        assert_eq!(config.retry.max_retries, Some(9));
        assert_eq!(config.retry.connection_timeout_ms, 20000);
        assert_eq!(config.connection.connection_id, "headlines");
        assert_eq!(config.connection.defer_strategy, resocket::DeferStrategy::KeepLast);
        assert!(!config.connection.defer_updates);
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let err = FeedConfig::from_yaml("url: http://localhost:8080\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_invalid_retry_policy() {
        let yaml = r#"
url: ws://localhost:8080
retry:
  reconnection_delay_grow_factor: 0.5
"#;
        assert!(matches!(
            FeedConfig::from_yaml(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
