//! The ingestion endpoint: one POST in, one event per transaction out.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Local;
use psstream_core::{
    DeliveryBatch, EventProducer, RowsetDecoder, RowsetMessage, TransactionEventBuilder,
};
use psstream_observability::CollectorMetrics;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthorizationPolicy, Authorizer, MessageHeaders};
use crate::config::CollectorConfig;
use crate::error::IngestError;

pub const GET_OK: &str = r#"{"status":"GET ok"}"#;
pub const POST_OK: &str = r#"{"status":"POST ok"}"#;

/// Lifecycle of one POST.
///
/// `Received → Authorizing → HeaderParsed → Streaming → Flushed → Responded`,
/// with `Rejected` reachable from `Received` and `Authorizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Authorizing,
    HeaderParsed,
    Streaming,
    Flushed,
    Responded,
    Rejected,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authorizing => "authorizing",
            Self::HeaderParsed => "header_parsed",
            Self::Streaming => "streaming",
            Self::Flushed => "flushed",
            Self::Responded => "responded",
            Self::Rejected => "rejected",
        }
    }

    fn advance(&mut self, next: RequestState) {
        trace!(from = self.as_str(), to = next.as_str(), "request state");
        *self = next;
    }
}

/// Shared handler state. Cloned per request; the producer handle is the
/// only thing shared between in-flight requests.
#[derive(Clone)]
pub struct CollectorState {
    producer: Arc<dyn EventProducer>,
    topic: Arc<str>,
    authorizer: Arc<dyn Authorizer>,
    metrics: CollectorMetrics,
}

impl std::fmt::Debug for CollectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorState")
            .field("producer", &self.producer.name())
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl CollectorState {
    /// State with an open authorization policy.
    pub fn new(producer: Arc<dyn EventProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: Arc::from(topic.into()),
            authorizer: Arc::new(AuthorizationPolicy::open()),
            metrics: CollectorMetrics::global(),
        }
    }

    /// State for a configured collector: topic and policy from `config`.
    pub fn from_config(config: &CollectorConfig, producer: Arc<dyn EventProducer>) -> Self {
        Self::new(producer, config.topic.clone()).with_authorizer(config.authorization.clone())
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn with_metrics(mut self, metrics: CollectorMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decode one message and publish its transactions.
    ///
    /// Returns the number of events published. Events dispatched before a
    /// mid-stream failure stay published; the error is returned without a
    /// flush.
    pub async fn ingest(&self, headers: &MessageHeaders, body: Bytes) -> Result<u64, IngestError> {
        self.ingest_tracked(headers, body, &mut RequestState::Received)
            .await
    }

    /// Like [`ingest`](Self::ingest), recording progress in `state`. On
    /// success `state` ends at `Flushed`; a rejection leaves it at `Rejected`.
    pub async fn ingest_tracked(
        &self,
        headers: &MessageHeaders,
        body: Bytes,
        state: &mut RequestState,
    ) -> Result<u64, IngestError> {
        *state = RequestState::Received;
        debug!(
            to = ?headers.to,
            from = ?headers.from,
            message_name = ?headers.message_name,
            "message received"
        );

        if let Err(e) = headers.check_single_chunk() {
            state.advance(RequestState::Rejected);
            return Err(e);
        }

        state.advance(RequestState::Authorizing);
        if !self.authorizer.authorize(headers) {
            state.advance(RequestState::Rejected);
            info!("Unauthorized message received");
            debug!(
                to = ?headers.to,
                from = ?headers.from,
                message_name = ?headers.message_name,
                "rejected message headers"
            );
            return Err(IngestError::Unauthorized);
        }

        let transaction_id = headers.require_transaction_id()?;
        let orig_time_stamp = headers.require_orig_time_stamp()?;

        let mut decoder = RowsetDecoder::from_bytes(body);
        let message = RowsetMessage::new(decoder.read_header()?, transaction_id, orig_time_stamp);
        state.advance(RequestState::HeaderParsed);
        info!(
            message_name = %message.message_name,
            fields = message.field_types.field_count(),
            transaction_id = %message.transaction_id,
            orig_time_stamp = %message.orig_time_stamp,
            "rowset message accepted"
        );

        let builder = TransactionEventBuilder::new(transaction_id, orig_time_stamp);
        let mut transactions = decoder.transactions()?;
        state.advance(RequestState::Streaming);

        let mut deliveries = DeliveryBatch::new();
        let mut published = 0u64;
        for fragment in transactions.by_ref() {
            let (event, wire) = builder.encode(fragment?, Local::now().fixed_offset())?;
            let delivery = self
                .producer
                .dispatch(&self.topic, Bytes::from(wire), event.key())
                .await?;
            deliveries.push(delivery);
            trace!(
                transaction_id = %event.transaction_id,
                transaction_index = event.transaction_index,
                "transaction dispatched"
            );
            self.metrics.record_published(&message.message_name);
            published += 1;
        }
        debug!(
            transactions = published,
            peak_retained_bytes = transactions.peak_retained_bytes(),
            "transaction pass complete"
        );

        let started = Instant::now();
        self.producer.flush(deliveries).await?;
        self.metrics
            .record_flush_latency(started.elapsed().as_secs_f64() * 1_000.0);
        state.advance(RequestState::Flushed);

        info!(
            message_name = %message.message_name,
            transaction_id = %message.transaction_id,
            transactions = published,
            "rowset message published"
        );
        Ok(published)
    }

    fn record_failure(&self, err: &IngestError) {
        match err {
            IngestError::Unauthorized
            | IngestError::ProtocolViolation { .. }
            | IngestError::MissingHeader(_) => {
                self.metrics.record_rejected(err.kind());
                warn!(reason = err.kind(), "message rejected: {err}");
            }
            IngestError::Decode(_) => {
                self.metrics.record_decode_error(err.kind());
                warn!(reason = err.kind(), "message failed to decode: {err}");
            }
            IngestError::Broker(_) => {
                self.metrics.record_broker_error(err.kind());
                error!(producer = self.producer.name(), "broker failure: {err}");
            }
            IngestError::Serialization(_) => {
                error!("event serialization failed: {err}");
            }
        }
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// `GET`: static health probe.
pub async fn health() -> Response {
    json_response(GET_OK)
}

/// `POST`: ingest one rowset message.
pub async fn ingest(
    State(state): State<CollectorState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = MessageHeaders::from_header_map(&headers);
    state.metrics.record_received();

    let mut progress = RequestState::Received;
    let result = state.ingest_tracked(&headers, body, &mut progress).await;
    if let Err(err) = &result {
        state.record_failure(err);
    }
    respond(&mut progress, result)
}

/// Final transition: a flushed request becomes `Responded` with the success
/// body; any failure is answered from where it stopped.
fn respond(progress: &mut RequestState, result: Result<u64, IngestError>) -> Response {
    match result {
        Ok(_) => {
            progress.advance(RequestState::Responded);
            json_response(POST_OK)
        }
        Err(err) => {
            debug!(state = progress.as_str(), "request failed");
            err.into_response()
        }
    }
}

fn json_response(body: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
