//! Message model shared by the bus boundary and the capture pipeline
//!
//! - [`Headers`]: ordered multimap with case-insensitive keys
//! - [`Payload`]: message body variants with a stable text rendering
//! - [`MessageSnapshot`]: read-only copy of an in-flight message

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message headers
///
/// Keys compare case-insensitively and may repeat. Insertion order is kept so
/// the rendered text is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `name`, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value is stored under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a value, keeping existing values under the same name
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value under `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Remove every value under `name`, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Copy of this set without `name`
    pub fn without(&self, name: &str) -> Headers {
        let mut copy = self.clone();
        copy.remove(name);
        copy
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as text, one `name: value` line per entry
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.entries {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// No body
    Empty,
    /// UTF-8 text
    Text(String),
    /// Structured JSON document
    Json(serde_json::Value),
    /// Opaque bytes, rendered as base64
    Bytes(Vec<u8>),
}

impl Payload {
    /// Textual snapshot used for persisted records
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => Ok(()),
            Payload::Text(s) => f.write_str(s),
            Payload::Json(v) => write!(f, "{}", v),
            Payload::Bytes(b) => f.write_str(&BASE64.encode(b)),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

/// Read-only copy of an in-flight message
///
/// Taken at interception time: the live message may be mutated or consumed
/// by the bus once the interceptor returns.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    /// Destination address
    pub address: String,
    /// Address replies should be sent to, if the sender expects one
    pub reply_address: Option<String>,
    /// All headers, including the causality header if present
    pub headers: Headers,
    /// Text rendering of the body
    pub body: String,
}

impl MessageSnapshot {
    /// Build a snapshot from message parts
    pub fn new(
        address: impl Into<String>,
        reply_address: Option<String>,
        headers: Headers,
        body: impl Into<String>,
    ) -> Self {
        MessageSnapshot {
            address: address.into(),
            reply_address,
            headers,
            body: body.into(),
        }
    }
}
