//! Envelope - the JSON-RPC wire wrapper for every call.
//!
//! Requests always use `method = "call"`; the real operation is selected by
//! the URL path and described by `params`. Responses are HTTP 200 even for
//! application failures, which travel in the `error` member.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TypesError;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outgoing JSON-RPC request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`
    pub jsonrpc: String,
    /// Always `"call"`
    pub method: String,
    /// Operation payload
    pub params: Value,
}

impl RpcRequest {
    /// Wrap a payload in a `call` envelope.
    pub fn call(params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "call".to_string(),
            params,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        serde_json::to_vec(self).map_err(TypesError::Serialization)
    }
}

/// Incoming JSON-RPC response body.
///
/// `error` is kept as raw JSON: its shape varies between server generations
/// and the untouched payload is carried as the cause of classified errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Success payload
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(default)]
    pub error: Option<Value>,
}

impl RpcResponse {
    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(TypesError::Deserialization)
    }

    /// Whether the server reported an application-level failure.
    pub fn is_error(&self) -> bool {
        matches!(&self.error, Some(e) if !e.is_null())
    }
}

/// Lenient view over a server error payload.
///
/// `{code, message, data: {name, debug, message, fault_code, ...}}` - every
/// member is optional on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcErrorPayload {
    /// Numeric error code (200, 100, 300 ... depending on generation)
    pub code: Option<i64>,
    /// Top-level message, e.g. `"Odoo Server Error"`
    pub message: String,
    /// Nested details
    pub data: ErrorData,
}

/// Nested `data` member of a server error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorData {
    /// Fully qualified exception type name
    pub name: Option<String>,
    /// Server traceback
    pub debug: Option<String>,
    /// Exception message
    pub message: Option<String>,
    /// Legacy compound fault string (`"<Type> -- <rest>"`)
    pub fault_code: Option<String>,
    /// Members this client does not interpret
    pub extra: Map<String, Value>,
}

impl RpcErrorPayload {
    /// Read an error payload without failing on missing or mistyped members.
    pub fn from_value(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64);
        let message = value
            .get("message")
            .map(text_of)
            .unwrap_or_default();
        let data = value
            .get("data")
            .and_then(Value::as_object)
            .map(ErrorData::from_map)
            .unwrap_or_default();
        Self {
            code,
            message,
            data,
        }
    }
}

impl ErrorData {
    fn from_map(map: &Map<String, Value>) -> Self {
        let mut extra = map.clone();
        let mut take = |key: &str| extra.remove(key).filter(|v| !v.is_null()).map(|v| text_of(&v));
        let name = take("name");
        let debug = take("debug");
        let message = take("message");
        let fault_code = take("fault_code");
        Self {
            name,
            debug,
            message,
            fault_code,
            extra,
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
