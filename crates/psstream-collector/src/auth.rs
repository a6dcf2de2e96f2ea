//! Request headers and the authorization predicate.

use std::collections::BTreeSet;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

// ─── Headers ────────────────────────────────────────────────────────────────

/// PeopleSoft integration-broker headers carried by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub to: Option<String>,
    pub from: Option<String>,
    pub message_name: Option<String>,
    pub transaction_id: Option<String>,
    pub orig_time_stamp: Option<String>,
    pub data_chunk: Option<String>,
    pub data_chunk_count: Option<String>,
}

impl MessageHeaders {
    /// Header values that are absent or not valid UTF-8 become `None`.
    /// Names are matched case-insensitively (`TransactionID` == `transactionid`).
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            to: get("to"),
            from: get("from"),
            message_name: get("messagename"),
            transaction_id: get("transactionid"),
            orig_time_stamp: get("origtimestamp"),
            data_chunk: get("datachunk"),
            data_chunk_count: get("datachunkcount"),
        }
    }

    /// Only single-chunk messages are accepted.
    pub fn check_single_chunk(&self) -> Result<(), IngestError> {
        for (header, value) in [
            ("DataChunk", &self.data_chunk),
            ("DataChunkCount", &self.data_chunk_count),
        ] {
            if value.as_deref() != Some("1") {
                return Err(IngestError::ProtocolViolation {
                    header,
                    expected: "1",
                    actual: value.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    pub fn require_transaction_id(&self) -> Result<&str, IngestError> {
        self.transaction_id
            .as_deref()
            .ok_or(IngestError::MissingHeader("TransactionID"))
    }

    pub fn require_orig_time_stamp(&self) -> Result<&str, IngestError> {
        self.orig_time_stamp
            .as_deref()
            .ok_or(IngestError::MissingHeader("OrigTimeStamp"))
    }
}

// ─── Authorizer ─────────────────────────────────────────────────────────────

/// Decides whether a message may be published.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, headers: &MessageHeaders) -> bool;
}

/// Blanket impl so closures can be used directly.
impl<F> Authorizer for F
where
    F: Fn(&MessageHeaders) -> bool + Send + Sync,
{
    fn authorize(&self, headers: &MessageHeaders) -> bool {
        self(headers)
    }
}

/// Allow/deny lists for one header.
///
/// An empty `allow` list accepts any value, including a missing header.
/// A value in `deny` is always rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    #[serde(default)]
    pub allow: BTreeSet<String>,
    #[serde(default)]
    pub deny: BTreeSet<String>,
}

impl HeaderRule {
    pub fn allowing<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: values.into_iter().map(Into::into).collect(),
            deny: BTreeSet::new(),
        }
    }

    pub fn permits(&self, value: Option<&str>) -> bool {
        match value {
            Some(v) if self.deny.contains(v) => false,
            Some(v) => self.allow.is_empty() || self.allow.contains(v),
            None => self.allow.is_empty(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Header-based policy: `recipients` applies to `To`, `senders` to `From`,
/// `message_names` to `MessageName`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    #[serde(default)]
    pub recipients: HeaderRule,
    #[serde(default)]
    pub senders: HeaderRule,
    #[serde(default)]
    pub message_names: HeaderRule,
}

impl AuthorizationPolicy {
    /// A policy that accepts every message.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.recipients.is_open() && self.senders.is_open() && self.message_names.is_open()
    }
}

impl Authorizer for AuthorizationPolicy {
    fn authorize(&self, headers: &MessageHeaders) -> bool {
        self.recipients.permits(headers.to.as_deref())
            && self.senders.permits(headers.from.as_deref())
            && self.message_names.permits(headers.message_name.as_deref())
    }
}
