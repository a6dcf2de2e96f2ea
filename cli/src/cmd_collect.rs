//! `psstream collect`: run the HTTP collector.

use std::path::Path;

use anyhow::{Context, Result};
use psstream_broker::build_producer;
use psstream_collector::{serve, CollectorConfig, CollectorState};
use psstream_observability::init_tracing;
use tracing::info;

/// Command-line settings layered over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub topic: Option<String>,
    pub senders: Vec<String>,
    pub recipients: Vec<String>,
    pub message_names: Vec<String>,
}

impl Overrides {
    fn apply(self, config: &mut CollectorConfig) {
        if let Some(port) = self.port {
            config.set_port(port);
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        let policy = &mut config.authorization;
        policy.senders.allow.extend(self.senders);
        policy.recipients.allow.extend(self.recipients);
        policy.message_names.allow.extend(self.message_names);
    }
}

pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> Result<()> {
    let mut config = match config_path {
        Some(path) => CollectorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CollectorConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("invalid collector configuration")?;

    init_tracing(&config.log).context("installing tracing subscriber")?;

    let producer = build_producer(&config.broker).context("creating producer")?;
    info!(
        producer = producer.name(),
        topic = %config.topic,
        open_policy = config.authorization.is_open(),
        "collector starting"
    );

    let addr = config.listen_addr()?;
    let state = CollectorState::from_config(&config, producer);
    serve(state, addr, config.max_body_bytes)
        .await
        .with_context(|| format!("serving on {addr}"))
}
