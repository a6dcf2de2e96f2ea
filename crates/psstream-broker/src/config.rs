//! Producer configuration.

use std::collections::HashMap;
use std::sync::Arc;

use psstream_core::{BrokerError, EventProducer};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::memory::MemoryProducer;

/// Which producer backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    #[default]
    Kafka,
    Memory,
}

/// Broker section of the collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub kind: BrokerKind,
    /// Kafka client settings, passed through verbatim
    /// (e.g. `bootstrap.servers`, `message.timeout.ms`).
    #[serde(default)]
    pub kafka: HashMap<String, String>,
}

impl BrokerConfig {
    pub fn memory() -> Self {
        Self {
            kind: BrokerKind::Memory,
            kafka: HashMap::new(),
        }
    }

    /// Check the settings required by the selected backend.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.kind == BrokerKind::Kafka
            && self
                .kafka
                .get("bootstrap.servers")
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(BrokerError::Config(
                "kafka broker requires `bootstrap.servers`".into(),
            ));
        }
        Ok(())
    }
}

/// Build the producer selected by `config`.
pub fn build_producer(config: &BrokerConfig) -> Result<Arc<dyn EventProducer>, BrokerError> {
    config.validate()?;
    match config.kind {
        BrokerKind::Memory => {
            info!("Using in-memory producer; events are not published anywhere");
            Ok(Arc::new(MemoryProducer::new()))
        }
        BrokerKind::Kafka => kafka_producer(config),
    }
}

#[cfg(feature = "kafka")]
fn kafka_producer(config: &BrokerConfig) -> Result<Arc<dyn EventProducer>, BrokerError> {
    Ok(Arc::new(crate::kafka::KafkaProducer::new(&config.kafka)?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_producer(_config: &BrokerConfig) -> Result<Arc<dyn EventProducer>, BrokerError> {
    Err(BrokerError::Config(
        "kafka support is not compiled in; rebuild with `--features kafka`".into(),
    ))
}
