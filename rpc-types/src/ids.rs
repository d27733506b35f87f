//! Identity and ordering types for odoo-rpc.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A process-unique identifier for an outgoing RPC request.
///
/// Assigned from a strictly increasing counter, displayed as `r<n>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a RequestId from a counter value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self)
    }
}

/// An opaque server-side session identifier.
///
/// The value is a bearer secret: `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw session id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw session id (for headers and request bodies).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken([{} chars REDACTED])", self.0.len())
    }
}

/// Server-issued resume point for incremental pulls.
///
/// Opaque to the client: it is stored and echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(Value);

impl Watermark {
    /// Wrap a raw watermark value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Get the raw value as sent by the server.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Convert into the raw value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<&str> for Watermark {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Key of a record in a synchronized dataset.
///
/// Servers send ids as integers in removal lists and as strings in
/// object keys; both normalise to the same textual key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a RecordId from its textual form.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Normalise a JSON id (number or string). Other shapes are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Get the textual key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
