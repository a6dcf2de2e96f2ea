//! Collector configuration, loaded from YAML.

use std::net::SocketAddr;
use std::path::Path;

use psstream_broker::BrokerConfig;
use psstream_observability::LogConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthorizationPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Bind address, e.g. "0.0.0.0:8000"
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Topic every transaction event is produced to
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Request body limit in bytes; the whole single-chunk message is buffered
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub authorization: AuthorizationPolicy,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listen() -> String { "0.0.0.0:8000".into() }
fn default_topic() -> String { "psstream".into() }
fn default_max_body_bytes() -> usize { 64 * 1024 * 1024 }

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            topic: default_topic(),
            max_body_bytes: default_max_body_bytes(),
            broker: BrokerConfig::default(),
            authorization: AuthorizationPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Replace the port of the listen address, keeping its host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.listen.rsplit_once(':') {
            Some((host, _)) => host,
            None => self.listen.as_str(),
        };
        self.listen = format!("{host}:{port}");
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen address '{}'", self.listen)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("topic must not be empty".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be positive".into()));
        }
        self.listen_addr()?;
        self.broker
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
