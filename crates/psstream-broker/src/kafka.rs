//! Kafka producer backed by `rdkafka`.
//!
//! `dispatch` only enqueues into librdkafka and turns the delivery future
//! into a [`Delivery`]; `flush` awaits the deliveries of the caller's batch.
//! No retries happen here beyond what the client itself is configured for
//! (`message.send.max.retries`, `message.timeout.ms`).

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use psstream_core::{BrokerError, Delivery, DeliveryBatch, EventProducer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, warn};

pub struct KafkaProducer {
    brokers: String,
    producer: FutureProducer,
}

// Needed because rdkafka's FutureProducer doesn't impl Debug
impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("brokers", &self.brokers)
            .finish()
    }
}

impl KafkaProducer {
    /// Create a producer from raw client settings.
    ///
    /// `request.required.acks` defaults to `all` so a confirmed delivery means
    /// the broker has durably stored the event.
    pub fn new(settings: &HashMap<String, String>) -> Result<Self, BrokerError> {
        let mut cfg = ClientConfig::new();
        cfg.set("request.required.acks", "all");
        for (key, value) in settings {
            cfg.set(key, value);
        }

        let producer: FutureProducer = cfg
            .create()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        Ok(Self {
            brokers: settings.get("bootstrap.servers").cloned().unwrap_or_default(),
            producer,
        })
    }
}

#[async_trait]
impl EventProducer for KafkaProducer {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn dispatch(
        &self,
        topic: &str,
        payload: Bytes,
        key: &str,
    ) -> Result<Delivery, BrokerError> {
        let record = FutureRecord::to(topic).payload(payload.as_ref()).key(key);
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _record)| BrokerError::Dispatch {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        debug!(topic, key, size = payload.len(), "enqueued to kafka");

        let topic = topic.to_string();
        Ok(Delivery::new(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    debug!(%topic, partition, offset, "delivered to kafka");
                    Ok(())
                }
                Ok(Err((e, _message))) => {
                    warn!(%topic, "Kafka delivery failed: {e}");
                    Err(BrokerError::Flush {
                        reason: e.to_string(),
                    })
                }
                Err(_canceled) => Err(BrokerError::Flush {
                    reason: "delivery canceled".into(),
                }),
            }
        }))
    }

    async fn flush(&self, batch: DeliveryBatch) -> Result<(), BrokerError> {
        debug!(deliveries = batch.len(), "awaiting kafka acknowledgements");
        batch.confirm().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    /// Nothing listens on port 1, so every delivery times out.
    fn unreachable_producer() -> KafkaProducer {
        let settings = HashMap::from([
            ("bootstrap.servers".to_string(), "127.0.0.1:1".to_string()),
            ("message.timeout.ms".to_string(), "1500".to_string()),
        ]);
        KafkaProducer::new(&settings).unwrap()
    }

    async fn dispatch_one(producer: &KafkaProducer, key: &str) -> DeliveryBatch {
        let mut batch = DeliveryBatch::new();
        let delivery = producer
            .dispatch("psstream-test", Bytes::from_static(b"{}"), key)
            .await
            .unwrap();
        batch.push(delivery);
        batch
    }

    #[tokio::test]
    async fn each_flush_waits_for_its_own_deliveries() {
        let producer = unreachable_producer();
        let batch_a = dispatch_one(&producer, "TX-A").await;
        let batch_b = dispatch_one(&producer, "TX-B").await;

        let started = Instant::now();
        let (a, b) = tokio::join!(producer.flush(batch_a), producer.flush(batch_b));

        assert!(matches!(a, Err(BrokerError::Flush { .. })), "{a:?}");
        assert!(matches!(b, Err(BrokerError::Flush { .. })), "{b:?}");
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn failed_request_does_not_leak_into_next_flush() {
        let producer = unreachable_producer();
        // A request that aborts mid-stream drops its batch without flushing.
        drop(dispatch_one(&producer, "TX-A").await);

        let started = Instant::now();
        assert!(producer.flush(DeliveryBatch::new()).await.is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
