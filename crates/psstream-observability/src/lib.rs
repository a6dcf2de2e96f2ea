//! # psstream-observability
//!
//! OpenTelemetry metrics and `tracing` setup for the collector.
//!
//! ## Built-in metrics
//! - `psstream.messages_received`: counter
//! - `psstream.messages_rejected`: counter, tagged with reason
//! - `psstream.transactions_published`: counter, tagged with message name
//! - `psstream.decode_errors`: counter, tagged with error type
//! - `psstream.broker_errors`: counter, tagged with stage
//! - `psstream.flush_latency_ms`: histogram
//!
//! No exporter is installed here; without a meter provider the instruments
//! are no-ops.
//!
//! ## Structured logging
//! Text or JSON logs, level configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::CollectorMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
