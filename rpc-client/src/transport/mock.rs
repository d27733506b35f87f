//! Mock transport for testing.
//!
//! Replies are registered per URL suffix, either one-shot (queued) or
//! persistent (stubbed). Every request is captured for verification.

use super::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with a JSON body.
    Json(Value),
    /// Arbitrary status and raw body.
    Status(u16, Vec<u8>),
    /// Transport-level failure.
    Fail(String),
}

/// Mock transport for testing.
///
/// Allows scripting replies and capturing sent requests for verification.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    sent_requests: Vec<HttpRequest>,
    queued: HashMap<String, VecDeque<MockReply>>,
    stubbed: HashMap<String, MockReply>,
    fail_next_send: Option<String>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for requests whose URL ends with `path`.
    ///
    /// Queued replies take precedence over stubs and are consumed in order.
    pub fn queue_reply(&self, path: &str, reply: MockReply) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queue a one-shot `{"result": ...}` reply.
    pub fn queue_result(&self, path: &str, result: Value) {
        self.queue_reply(path, MockReply::Json(json!({"jsonrpc": "2.0", "result": result})));
    }

    /// Queue a one-shot `{"error": ...}` reply.
    pub fn queue_error(&self, path: &str, error: Value) {
        self.queue_reply(path, MockReply::Json(json!({"jsonrpc": "2.0", "error": error})));
    }

    /// Register a persistent reply used whenever nothing is queued.
    pub fn stub_reply(&self, path: &str, reply: MockReply) {
        let mut inner = self.inner.lock().unwrap();
        inner.stubbed.insert(path.to_string(), reply);
    }

    /// Register a persistent `{"result": ...}` reply.
    pub fn stub_result(&self, path: &str, result: Value) {
        self.stub_reply(path, MockReply::Json(json!({"jsonrpc": "2.0", "result": result})));
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Delay every reply (requests are still recorded immediately).
    pub fn set_latency(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.latency = Some(latency);
    }

    /// Get all requests that were sent.
    pub fn sent_requests(&self) -> Vec<HttpRequest> {
        let inner = self.inner.lock().unwrap();
        inner.sent_requests.clone()
    }

    /// Get the requests whose URL ends with `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent_requests
            .iter()
            .filter(|r| r.url.ends_with(path))
            .cloned()
            .collect()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<HttpRequest> {
        let inner = self.inner.lock().unwrap();
        inner.sent_requests.last().cloned()
    }

    /// Clear all state (requests, replies, failures).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl MockTransportInner {
    fn next_reply(&mut self, url: &str) -> Option<MockReply> {
        let queued = self
            .queued
            .iter_mut()
            .find(|(path, replies)| url.ends_with(path.as_str()) && !replies.is_empty())
            .and_then(|(_, replies)| replies.pop_front());
        queued.or_else(|| {
            self.stubbed
                .iter()
                .find(|(path, _)| url.ends_with(path.as_str()))
                .map(|(_, reply)| reply.clone())
        })
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (reply, latency) = {
            let mut inner = self.inner.lock().unwrap();
            let url = request.url.clone();
            inner.sent_requests.push(request);

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            (inner.next_reply(&url), inner.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(MockReply::Json(body)) => Ok(HttpResponse::ok(body.to_string().into_bytes())),
            Some(MockReply::Status(status, body)) => Ok(HttpResponse { status, body }),
            Some(MockReply::Fail(error)) => Err(TransportError::ConnectionFailed(error)),
            None => Err(TransportError::ConnectionFailed(
                "no reply scripted for request".to_string(),
            )),
        }
    }
}
