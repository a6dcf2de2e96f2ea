//! psstream-collector: HTTP ingestion endpoint.
//!
//! Accepts PeopleSoft rowset messages pushed over HTTP, decodes them with
//! [`psstream_core::RowsetDecoder`] and publishes one
//! [`TransactionEvent`](psstream_core::TransactionEvent) per transaction
//! through an [`EventProducer`](psstream_core::EventProducer), flushing
//! before acknowledging.
//!
//! ```text
//! POST body ──► chunk check ──► authorize ──► header pass ──► transaction pass
//!                                                              │  (per fragment)
//!                                                              ▼
//!                                                 build event ──► dispatch
//!                                                              │
//!                                                              ▼
//!                                                  flush ──► 200 {"status":"POST ok"}
//! ```

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod server;

pub use auth::{AuthorizationPolicy, Authorizer, HeaderRule, MessageHeaders};
pub use config::{CollectorConfig, ConfigError};
pub use endpoint::{CollectorState, RequestState};
pub use error::IngestError;
pub use server::{router, serve};
