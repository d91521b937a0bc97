//! Capture events produced by the interceptors
//!
//! A [`CaptureEvent`] is built synchronously inside an interceptor hook and
//! handed to the writer. It is immutable from creation and consumed exactly
//! once. The timestamp is taken here, not at persistence time.

use crate::causality::CausalityHeader;
use crate::message::MessageSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the bus observed the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Observed by the outbound interceptor
    Sent,
    /// Observed by the inbound interceptor
    Received,
}

impl Direction {
    /// Stable lowercase name used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one intercepted message
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    message: MessageSnapshot,
    causality: Option<CausalityHeader>,
    direction: Direction,
    occurred_at: i64,
}

impl CaptureEvent {
    /// Capture a message now
    ///
    /// `causality` is `None` for unlabeled inbound messages.
    pub fn new(
        message: MessageSnapshot,
        causality: Option<CausalityHeader>,
        direction: Direction,
    ) -> Self {
        Self::at(message, causality, direction, now_millis())
    }

    /// Capture a message with an explicit timestamp (milliseconds since epoch)
    pub fn at(
        message: MessageSnapshot,
        causality: Option<CausalityHeader>,
        direction: Direction,
        occurred_at: i64,
    ) -> Self {
        CaptureEvent {
            message,
            causality,
            direction,
            occurred_at,
        }
    }

    /// The captured message
    pub fn message(&self) -> &MessageSnapshot {
        &self.message
    }

    /// Causality header, if the message carried a valid one
    pub fn causality(&self) -> Option<&CausalityHeader> {
        self.causality.as_ref()
    }

    /// Whether the event carries no usable causality header
    pub fn is_unlabeled(&self) -> bool {
        self.causality.is_none()
    }

    /// Direction of the capture
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Capture time in milliseconds since the Unix epoch
    pub fn occurred_at(&self) -> i64 {
        self.occurred_at
    }

    /// Split the event into its parts
    pub fn into_parts(self) -> (MessageSnapshot, Option<CausalityHeader>, Direction, i64) {
        (self.message, self.causality, self.direction, self.occurred_at)
    }
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
