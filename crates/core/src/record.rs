//! Persisted trace records and their storage layout
//!
//! ## Layout
//!
//! | Partition | Key | Value |
//! |-----------|-----|-------|
//! | [`RECORDS_PARTITION`] | decimal `record_id` | JSON [`TraceRecord`] |
//! | [`CORRELATION_PARTITION`] | `message_id` | decimal `record_id` |
//!
//! Field names of the JSON document are stable; downstream readers rely on
//! them.

use crate::causality::{MessageId, TRACE_HEADER};
use crate::error::{Result, TraceError};
use crate::event::{CaptureEvent, Direction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition holding one JSON document per record
pub const RECORDS_PARTITION: &str = "records";

/// Partition mapping sent message ids to their record
pub const CORRELATION_PARTITION: &str = "correlation";

/// Locator of a persisted record (its `record_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordLocator(pub u64);

impl RecordLocator {
    /// Storage key of the record
    pub fn key(&self) -> String {
        self.0.to_string()
    }

    /// Parse a storage key back into a locator
    pub fn parse(key: &str) -> Option<Self> {
        key.parse().ok().map(RecordLocator)
    }
}

impl fmt::Display for RecordLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable form of a capture event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Writer-assigned, strictly increasing id
    pub record_id: u64,
    /// Empty for unlabeled inbound captures
    pub message_id: String,
    /// Ancestor message ids
    pub parent_ids: Vec<String>,
    /// Empty when the call site gave no label
    pub label: String,
    /// Capture direction
    pub direction: Direction,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Destination address
    pub target_address: String,
    /// Empty when the message expected no reply
    pub reply_address: String,
    /// Application headers as text, causality header removed
    pub headers: String,
    /// Text snapshot of the body
    pub body: String,
}

impl TraceRecord {
    /// Build the record for `event` under `record_id`
    pub fn from_event(record_id: u64, event: CaptureEvent) -> Self {
        let (message, causality, direction, occurred_at) = event.into_parts();
        let (message_id, parent_ids, label) = match causality {
            Some(h) => (
                h.message_id.into_string(),
                h.parent_ids.into_iter().map(MessageId::into_string).collect(),
                h.label.unwrap_or_default(),
            ),
            None => (String::new(), Vec::new(), String::new()),
        };

        TraceRecord {
            record_id,
            message_id,
            parent_ids,
            label,
            direction,
            timestamp: occurred_at,
            target_address: message.address,
            reply_address: message.reply_address.unwrap_or_default(),
            headers: message.headers.without(TRACE_HEADER).to_text(),
            body: message.body,
        }
    }

    /// Locator of this record
    pub fn locator(&self) -> RecordLocator {
        RecordLocator(self.record_id)
    }

    /// Whether this record should get a correlation index entry
    pub fn is_indexable(&self) -> bool {
        self.direction == Direction::Sent && !self.message_id.is_empty()
    }

    /// Encode as a JSON document
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    /// Decode a JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| TraceError::Serialization(e.to_string()))
    }
}
