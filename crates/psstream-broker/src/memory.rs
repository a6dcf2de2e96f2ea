//! In-memory producer.
//!
//! Records every dispatch and flush in call order. Nothing is published;
//! useful for tests and for running the collector without a broker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use psstream_core::{BrokerError, Delivery, DeliveryBatch, EventProducer};
use tracing::debug;

/// One dispatched payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
}

/// A call made against the producer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerCall {
    Dispatch(ProducedRecord),
    Flush,
}

/// In-memory [`EventProducer`].
#[derive(Debug, Default)]
pub struct MemoryProducer {
    calls: Mutex<Vec<ProducerCall>>,
    dispatches: AtomicUsize,
    /// Fail the dispatch with this 1-based number (0 = never).
    fail_dispatch_at: AtomicUsize,
    fail_flush: AtomicBool,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th dispatch (1-based, counted from creation) fail.
    pub fn fail_dispatch_at(self, n: usize) -> Self {
        self.fail_dispatch_at.store(n, Ordering::SeqCst);
        self
    }

    /// Make every flush fail.
    pub fn fail_flush(self) -> Self {
        self.fail_flush.store(true, Ordering::SeqCst);
        self
    }

    /// Every call in order.
    pub fn calls(&self) -> Vec<ProducerCall> {
        self.lock().clone()
    }

    /// Successfully dispatched records in order.
    pub fn records(&self) -> Vec<ProducedRecord> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                ProducerCall::Dispatch(record) => Some(record.clone()),
                ProducerCall::Flush => None,
            })
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    pub fn flush_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, ProducerCall::Flush))
            .count()
    }

    /// `true` when nothing at all was called.
    pub fn is_untouched(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProducerCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventProducer for MemoryProducer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn dispatch(
        &self,
        topic: &str,
        payload: Bytes,
        key: &str,
    ) -> Result<Delivery, BrokerError> {
        let n = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_dispatch_at.load(Ordering::SeqCst) {
            return Err(BrokerError::Dispatch {
                topic: topic.to_string(),
                reason: format!("injected failure on dispatch {n}"),
            });
        }
        debug!(topic, key, bytes = payload.len(), "memory dispatch");
        self.lock().push(ProducerCall::Dispatch(ProducedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        }));
        Ok(Delivery::confirmed())
    }

    async fn flush(&self, batch: DeliveryBatch) -> Result<(), BrokerError> {
        batch.confirm().await?;
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(BrokerError::Flush {
                reason: "injected flush failure".into(),
            });
        }
        self.lock().push(ProducerCall::Flush);
        Ok(())
    }
}
