//! Error types for the decode and publish pipeline.

use thiserror::Error;

/// Errors raised while decoding a rowset message.
///
/// Decoding is lazy: these surface at the point a traversal reaches the
/// offending content, so a caller may already have consumed earlier
/// transactions when one is returned.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed document at byte {position}: {reason}")]
    MalformedDocument { position: u64, reason: String },

    #[error("Document has no FieldTypes element")]
    MissingFieldTypes,

    #[error("Field '{field}' in FieldTypes has no type attribute")]
    MissingTypeAttribute { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn malformed(position: u64, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            position,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the document content rather than I/O.
    pub fn is_content_error(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Errors surfaced by an [`EventProducer`](crate::producer::EventProducer).
///
/// There is no retry layer on top of these; retries belong to the broker
/// client's own configuration.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Dispatch to topic '{topic}' failed: {reason}")]
    Dispatch { topic: String, reason: String },

    #[error("Flush failed: {reason}")]
    Flush { reason: String },

    #[error("Producer configuration error: {0}")]
    Config(String),
}
