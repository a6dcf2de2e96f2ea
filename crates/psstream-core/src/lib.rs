//! # psstream-core
//!
//! Core types and the streaming decoder shared by every psstream crate.
//!
//! A PeopleSoft rowset message is decoded in two forward-only passes over the
//! same buffered body: the header pass reads the message name and the
//! `FieldTypes` table, the transaction pass yields each `Transaction` element
//! as a self-contained XML fragment. Each fragment becomes one
//! [`TransactionEvent`] handed to an [`EventProducer`].
//!
//! ## Pipeline
//! ```text
//! request body (Bytes)
//!       │
//!       ├── RowsetDecoder::read_header ──▶ RowsetHeader (name, FieldTypes)
//!       │
//!       └── RowsetDecoder::transactions ─▶ TransactionFragment (1..N)
//!                                               │
//!                                               ▼
//!                                     TransactionEventBuilder
//!                                               │
//!                                               ▼
//!                                EventProducer::dispatch / flush
//! ```

pub mod decoder;
pub mod error;
pub mod event;
pub mod message;
pub mod producer;
pub mod projector;
pub mod tree;

pub use decoder::{local_name, RowsetDecoder, TransactionFragment, Transactions};
pub use error::{BrokerError, DecodeError};
pub use event::{TransactionEvent, TransactionEventBuilder};
pub use message::{FieldTypes, RowsetHeader, RowsetMessage};
pub use producer::{Delivery, DeliveryBatch, EventProducer};
pub use projector::{project, project_text, Projected};
pub use tree::XmlNode;
