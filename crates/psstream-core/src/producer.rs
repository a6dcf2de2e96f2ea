//! The broker producer seam.
//!
//! Delivery is tracked per request: `dispatch` hands back a [`Delivery`]
//! for the payload it enqueued, the caller collects them in a
//! [`DeliveryBatch`] and `flush` confirms exactly that batch. Requests sharing
//! one producer never observe each other's acknowledgements or failures.

use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::BrokerError;

/// Outcome of one dispatched payload, resolved when the broker acknowledges
/// or rejects it.
pub struct Delivery {
    outcome: BoxFuture<'static, Result<(), BrokerError>>,
}

impl Delivery {
    pub fn new<F>(outcome: F) -> Self
    where
        F: Future<Output = Result<(), BrokerError>> + Send + 'static,
    {
        Self {
            outcome: outcome.boxed(),
        }
    }

    /// A payload the backend already considers delivered.
    pub fn confirmed() -> Self {
        Self::new(futures::future::ready(Ok(())))
    }

    pub async fn wait(self) -> Result<(), BrokerError> {
        self.outcome.await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery").finish_non_exhaustive()
    }
}

/// The deliveries of one request, in dispatch order.
#[derive(Debug, Default)]
pub struct DeliveryBatch {
    pending: Vec<Delivery>,
}

impl DeliveryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delivery: Delivery) {
        self.pending.push(delivery);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every delivery in the batch.
    ///
    /// All outcomes are awaited even after a failure; the first failure is
    /// returned.
    pub async fn confirm(self) -> Result<(), BrokerError> {
        let mut first_failure = None;
        for delivery in self.pending {
            if let Err(e) = delivery.wait().await {
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A message-broker producer shared by all in-flight requests.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; they are stored as
/// `Arc<dyn EventProducer>` and called concurrently without extra locking.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Hand one payload to the client. Returns once it is enqueued; the
    /// returned [`Delivery`] resolves when the broker has acknowledged it.
    async fn dispatch(&self, topic: &str, payload: Bytes, key: &str)
        -> Result<Delivery, BrokerError>;

    /// Wait until every delivery in `batch` is acknowledged, or report the
    /// first failure among them.
    async fn flush(&self, batch: DeliveryBatch) -> Result<(), BrokerError>;
}
