//! Envelope Builder.
//!
//! Turns a path and a payload into a ready-to-send request: assigns the
//! request id, injects the session id into the body when the negotiated
//! [`SessionMode`] requires it, and sets the session, authorization and
//! correlation headers.

use rpc_core::SessionMode;
use rpc_types::{RequestId, RpcRequest, SessionToken, TypesError};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::transport::HttpRequest;

/// Header carrying the session id on every request.
pub const SESSION_HEADER: &str = "X-Openerp-Session-Id";
/// Header carrying the caller-supplied correlation id.
pub const CORRELATION_HEADER: &str = "X-Request-Id";

/// A built request, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Process-unique request id.
    pub request_id: RequestId,
    /// Absolute target URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON-RPC body.
    pub body: RpcRequest,
}

impl Envelope {
    /// Serialize into a transport request.
    pub fn into_http(self) -> Result<HttpRequest, TypesError> {
        let body = self.body.to_bytes()?;
        Ok(HttpRequest::post(self.url, self.headers, body))
    }
}

/// Builds envelopes; owns the request id counter.
#[derive(Debug)]
pub struct EnvelopeBuilder {
    base_url: String,
    authorization: Option<String>,
    counter: AtomicU64,
}

impl EnvelopeBuilder {
    /// Create a builder for a server.
    ///
    /// `authorization` is a bearer credential sent as `Authorization: Bearer <value>`.
    pub fn new(base_url: &str, authorization: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: authorization.filter(|a| !a.is_empty()),
            counter: AtomicU64::new(0),
        }
    }

    /// Resolve a path against the server base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Build an envelope with a fresh request id.
    pub fn build(
        &self,
        path: &str,
        mut params: Value,
        mode: SessionMode,
        token: Option<&SessionToken>,
        correlation_id: Option<&str>,
    ) -> Envelope {
        let request_id = RequestId::new(self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let session = token.map(SessionToken::as_str).unwrap_or_default();

        if mode.injects_body_session() {
            if let Value::Object(map) = &mut params {
                map.insert("session_id".to_string(), Value::String(session.to_string()));
            }
        }

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (SESSION_HEADER.to_string(), session.to_string()),
        ];
        if let Some(credential) = &self.authorization {
            headers.push(("Authorization".to_string(), format!("Bearer {}", credential)));
        }
        if let Some(correlation_id) = correlation_id {
            headers.push((CORRELATION_HEADER.to_string(), correlation_id.to_string()));
        }

        Envelope {
            request_id,
            url: self.resolve_url(path),
            headers,
            body: RpcRequest::call(params),
        }
    }
}
