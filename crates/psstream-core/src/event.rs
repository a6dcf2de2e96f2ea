//! Transaction events: the unit published to the broker.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::decoder::TransactionFragment;

/// One transaction of a rowset message, ready to publish.
///
/// Serializes to a compact JSON object with exactly five string fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// `TransactionID` header of the source message; also the partition key.
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    /// 1-based position of the transaction within its message.
    #[serde(rename = "TransactionIndex", with = "index_string")]
    pub transaction_index: u64,
    /// `OrigTimeStamp` header of the source message, passed through verbatim.
    #[serde(rename = "OrigTimeStamp")]
    pub orig_time_stamp: String,
    /// When this transaction was extracted, ISO-8601 with UTC offset.
    #[serde(rename = "CollectTimeStamp")]
    pub collect_time_stamp: String,
    /// The `Transaction` element as an XML string.
    #[serde(rename = "Transaction")]
    pub transaction: String,
}

impl TransactionEvent {
    /// Broker key: every transaction of one message shares it.
    pub fn key(&self) -> &str {
        &self.transaction_id
    }

    /// Compact JSON wire form.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Builds events for one message from its request-level metadata.
///
/// Building is pure: the capture instant is supplied by the caller and must
/// be sampled when the fragment is extracted, once per fragment.
#[derive(Debug, Clone)]
pub struct TransactionEventBuilder {
    transaction_id: String,
    orig_time_stamp: String,
}

impl TransactionEventBuilder {
    pub fn new(transaction_id: impl Into<String>, orig_time_stamp: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            orig_time_stamp: orig_time_stamp.into(),
        }
    }

    pub fn build(
        &self,
        fragment: TransactionFragment,
        collected_at: DateTime<FixedOffset>,
    ) -> TransactionEvent {
        TransactionEvent {
            transaction_id: self.transaction_id.clone(),
            transaction_index: fragment.index,
            orig_time_stamp: self.orig_time_stamp.clone(),
            collect_time_stamp: collected_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            transaction: fragment.xml,
        }
    }

    /// Build an event and its wire form together.
    pub fn encode(
        &self,
        fragment: TransactionFragment,
        collected_at: DateTime<FixedOffset>,
    ) -> Result<(TransactionEvent, String), serde_json::Error> {
        let event = self.build(fragment, collected_at);
        let wire = event.to_wire()?;
        Ok((event, wire))
    }
}

mod index_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(index: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(index)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
