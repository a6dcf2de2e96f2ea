//! psstream-broker: pluggable [`EventProducer`](psstream_core::EventProducer) backends.
//!
//! Backends:
//! - [`memory`]: records every dispatch in RAM (tests, dry runs)
//! - `kafka`: Kafka via `rdkafka` (feature: `kafka`)

pub mod config;
pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{build_producer, BrokerConfig, BrokerKind};
pub use memory::{MemoryProducer, ProducedRecord, ProducerCall};

#[cfg(feature = "kafka")]
pub use kafka::KafkaProducer;
