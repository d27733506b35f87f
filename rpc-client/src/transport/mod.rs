//! Transport abstraction for odoo-rpc.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying HTTP stack (a real client in applications, a mock in tests).
//!
//! # Design
//!
//! The transport performs exactly one request/response exchange:
//! - `send()` POSTs a body with headers and returns status plus raw body
//!
//! It knows nothing about JSON-RPC, sessions or error payloads. A non-2xx
//! status is still a successful exchange; only failures to obtain any
//! response at all are [`TransportError`]s.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.stub_result("/web/webclient/version_info", json!({"server_serie": "12.0"}));
//! let response = transport.send(request).await?;
//! ```

mod mock;

pub use mock::{MockReply, MockTransport};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,
}

/// One outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method (always `POST` for RPC traffic).
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a POST request.
    pub fn post(url: impl Into<String>, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers,
            body,
        }
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parse the body as JSON (for assertions and logging).
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Raw response of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait for performing single request/response exchanges.
///
/// Implementations handle the underlying mechanism (HTTP client, mock, etc).
/// Timeouts, TLS and cookies are the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
