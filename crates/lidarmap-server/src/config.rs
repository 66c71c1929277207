//! Configuration for the lidarmap server
//!
//! Loaded from an optional TOML file. Every section and field has a default,
//! so an empty file (or no file) gives a working local setup:
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [store]
//! max_age_ms = 1000.0
//! clean_interval_ms = 50.0
//!
//! [pubsub]
//! enabled = true
//! host = "localhost"
//! port = 9000
//! topic = "lidar/points"
//! reconnect_delay_ms = 5000
//!
//! [filter]
//! min_height = -0.5
//! max_height = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use lidarmap::StoreConfig;
use lidarmap_pubsub::{Address, ClientConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::HeightFilter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarmapConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub pubsub: PubSubConfig,
    pub filter: HeightFilter,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Message bus connection and ingestion topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Set to false to run with HTTP ingestion only
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Topic carrying point batches
    pub topic: String,
    pub reconnect_delay_ms: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 9000,
            topic: "lidar/points".to_string(),
            reconnect_delay_ms: 5000,
        }
    }
}

impl PubSubConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(Address::new(self.host.as_str(), self.port))
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
    }
}

impl LidarmapConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }
}

impl std::str::FromStr for LidarmapConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: LidarmapConfig = "".parse().unwrap();
        assert_eq!(config, LidarmapConfig::default());
        assert_eq!(config.server.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.store.clean_interval_ms, 50.0);
        assert_eq!(config.pubsub.topic, "lidar/points");
        assert_eq!(config.filter, HeightFilter::default());
    }

    #[test]
    fn test_partial_sections() {
        let config: LidarmapConfig = r#"
            [store]
            max_age_ms = 250.0

            [pubsub]
            host = "broker.local"
            reconnect_delay_ms = 100

            [filter]
            max_height = 1.8
        "#
        .parse()
        .unwrap();

        assert_eq!(config.store.max_age_ms, 250.0);
        assert_eq!(config.store.clean_interval_ms, 50.0);
        assert_eq!(config.pubsub.port, 9000);
        assert_eq!(config.filter.min_height, None);
        assert_eq!(config.filter.max_height, Some(1.8));

        let client = config.pubsub.client_config();
        assert_eq!(client.address.url(), "ws://broker.local:9000");
        assert_eq!(client.reconnect_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result: Result<LidarmapConfig, _> = "[server]\nport = \"http\"".parse();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = LidarmapConfig::from_file("/nonexistent/lidarmap.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let mut config = LidarmapConfig::default();
        config.filter.min_height = Some(-0.25);
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(text.parse::<LidarmapConfig>().unwrap(), config);
    }
}
