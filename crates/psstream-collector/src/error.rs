//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use psstream_core::{BrokerError, DecodeError};
use thiserror::Error;

/// Body returned when the authorization policy rejects a message.
pub const REJECTION_BODY: &str = "Message not accepted by collector.";

#[derive(Debug, Error)]
pub enum IngestError {
    /// Multi-chunk messages are not supported.
    #[error("Protocol violation: header {header} is '{actual}', expected '{expected}'")]
    ProtocolViolation {
        header: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Message not accepted by authorization policy")]
    Unauthorized,

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Broker failure: {0}")]
    Broker(#[from] BrokerError),

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::MissingHeader(_) => "missing_header",
            Self::Unauthorized => "unauthorized",
            Self::Decode(DecodeError::MalformedDocument { .. }) => "malformed_document",
            Self::Decode(DecodeError::MissingFieldTypes) => "missing_field_types",
            Self::Decode(DecodeError::MissingTypeAttribute { .. }) => "missing_type_attribute",
            Self::Decode(DecodeError::Io(_)) => "io",
            Self::Broker(BrokerError::Dispatch { .. }) => "dispatch",
            Self::Broker(BrokerError::Flush { .. }) => "flush",
            Self::Broker(BrokerError::Config(_)) => "broker_config",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Unauthorized => (status, REJECTION_BODY).into_response(),
            other => {
                let body = serde_json::json!({
                    "status": "error",
                    "reason": other.to_string(),
                });
                (status, axum::Json(body)).into_response()
            }
        }
    }
}
