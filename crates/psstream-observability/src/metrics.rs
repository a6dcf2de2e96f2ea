//! Collector metrics definitions.
//!
//! All metrics use OpenTelemetry conventions and are exported by whatever
//! meter provider the host installs.

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Central metrics handle for the collector.
#[derive(Clone)]
pub struct CollectorMetrics {
    pub messages_received: Counter<u64>,
    pub messages_rejected: Counter<u64>,
    pub transactions_published: Counter<u64>,
    pub decode_errors: Counter<u64>,
    pub broker_errors: Counter<u64>,
    pub flush_latency_ms: Histogram<f64>,
}

impl std::fmt::Debug for CollectorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorMetrics").finish_non_exhaustive()
    }
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::global()
    }
}

impl CollectorMetrics {
    /// Instruments on the global `psstream` meter.
    pub fn global() -> Self {
        Self::new(&global::meter("psstream"))
    }

    pub fn new(meter: &Meter) -> Self {
        Self {
            messages_received: meter
                .u64_counter("psstream.messages_received")
                .with_description("Rowset messages received over HTTP")
                .build(),
            messages_rejected: meter
                .u64_counter("psstream.messages_rejected")
                .with_description("Messages rejected before decoding")
                .build(),
            transactions_published: meter
                .u64_counter("psstream.transactions_published")
                .with_description("Transaction events handed to the broker")
                .build(),
            decode_errors: meter
                .u64_counter("psstream.decode_errors")
                .with_description("Messages that failed to decode")
                .build(),
            broker_errors: meter
                .u64_counter("psstream.broker_errors")
                .with_description("Dispatch or flush failures")
                .build(),
            flush_latency_ms: meter
                .f64_histogram("psstream.flush_latency_ms")
                .with_description("Time spent waiting for broker confirmation")
                .build(),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.add(1, &[]);
    }

    pub fn record_rejected(&self, reason: &str) {
        self.messages_rejected
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }

    pub fn record_published(&self, message_name: &str) {
        self.transactions_published
            .add(1, &[KeyValue::new("message_name", message_name.to_string())]);
    }

    pub fn record_decode_error(&self, error_type: &str) {
        self.decode_errors
            .add(1, &[KeyValue::new("error_type", error_type.to_string())]);
    }

    pub fn record_broker_error(&self, stage: &str) {
        self.broker_errors
            .add(1, &[KeyValue::new("stage", stage.to_string())]);
    }

    pub fn record_flush_latency(&self, ms: f64) {
        self.flush_latency_ms.record(ms, &[]);
    }
}
