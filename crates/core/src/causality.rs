//! Causality header carried by every traced message
//!
//! The header is the propagated identity that links a message to the
//! message(s) it descends from:
//! - `message_id`: generated at the point of origin, never forwarded unchanged
//! - `parent_ids`: ordered ancestors (a reply descends from its request,
//!   a forward descends from the message that triggered it)
//! - `label`: optional grouping string supplied by the call site
//!
//! The header travels out-of-band under [`TRACE_HEADER`] and is encoded as a
//! compact JSON object. Decoding distinguishes an absent header (`Ok(None)`)
//! from a malformed one (`Err(MalformedHeaderError)`), so the hot path never
//! needs to unwind on the common "untraced" case.

use crate::error::MalformedHeaderError;
use crate::message::Headers;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved header key under which the causality header travels.
///
/// Header lookups are case-insensitive, so `X-BusTrace` matches too.
pub const TRACE_HEADER: &str = "x-bustrace";

/// Number of symbols in a generated message id.
pub const MESSAGE_ID_LEN: usize = 16;

/// Identifier of a single traced message
///
/// Generated ids are [`MESSAGE_ID_LEN`] alphanumeric symbols drawn from the
/// thread-local CSPRNG (62^16 possibilities), which keeps the collision
/// probability negligible over a process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh random id
    ///
    /// # Examples
    ///
    /// ```
    /// use bustrace_core::MessageId;
    ///
    /// let a = MessageId::generate();
    /// let b = MessageId::generate();
    /// assert_eq!(a.as_str().len(), 16);
    /// assert_ne!(a, b);
    /// ```
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(MESSAGE_ID_LEN)
            .map(char::from)
            .collect();
        MessageId(id)
    }

    /// Wrap an id received from elsewhere (e.g. a propagated header)
    pub fn from_string(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Propagated causal identity of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalityHeader {
    /// Unique id of this message
    pub message_id: MessageId,
    /// Ancestors this message descends from, oldest relationship first
    #[serde(default)]
    pub parent_ids: Vec<MessageId>,
    /// Optional grouping label
    #[serde(default)]
    pub label: Option<String>,
}

impl CausalityHeader {
    /// Create a header with a freshly generated id
    pub fn create(parent_ids: Vec<MessageId>, label: Option<String>) -> Self {
        CausalityHeader {
            message_id: MessageId::generate(),
            parent_ids,
            label,
        }
    }

    /// Create a root header (no parents)
    pub fn root(label: Option<String>) -> Self {
        Self::create(Vec::new(), label)
    }

    /// Create a header for a message that descends from `parent`
    ///
    /// The label is inherited from the parent unless one is given.
    pub fn child_of(parent: &CausalityHeader, label: Option<String>) -> Self {
        Self::create(
            vec![parent.message_id.clone()],
            label.or_else(|| parent.label.clone()),
        )
    }

    /// Whether this header starts a new causal chain
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Encode as header text
    pub fn serialize(&self) -> String {
        // A struct of strings and a Vec<String> cannot fail to encode.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode from header text
    ///
    /// # Errors
    ///
    /// Returns [`MalformedHeaderError`] when the text is not a valid encoded
    /// header, or when it decodes to an empty message id.
    pub fn deserialize(text: &str) -> Result<Self, MalformedHeaderError> {
        let header: CausalityHeader =
            serde_json::from_str(text).map_err(|e| MalformedHeaderError::new(text, e.to_string()))?;
        if header.message_id.as_str().is_empty() {
            return Err(MalformedHeaderError::new(text, "empty message_id"));
        }
        Ok(header)
    }

    /// Extract the header from a message's header set
    ///
    /// Returns `Ok(None)` when the reserved key is absent.
    pub fn extract(headers: &Headers) -> Result<Option<Self>, MalformedHeaderError> {
        match headers.get(TRACE_HEADER) {
            None => Ok(None),
            Some(text) => Self::deserialize(text).map(Some),
        }
    }

    /// Attach this header to a message's header set, replacing any previous one
    pub fn attach(&self, headers: &mut Headers) {
        headers.set(TRACE_HEADER, self.serialize());
    }
}
