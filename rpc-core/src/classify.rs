//! Server error classification.
//!
//! The server reports every application failure as an HTTP 200 response with
//! an `error` member whose shape differs between server generations. This
//! module maps those payloads onto a fixed taxonomy.
//!
//! Classification is an ordered match; the first rule that matches wins:
//!
//! 1. resource not found (`werkzeug.exceptions.NotFound`)
//! 2. session expired (two server generations)
//! 3. database missing
//! 4. access denied
//! 5. fallback on the compound fault code, then on the raw message
//!
//! Side effects (clearing the stored session, broadcasting events) are
//! returned as [`Action`]s for the caller to perform.

use regex::Regex;
use rpc_types::RpcErrorPayload;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Replacement for newlines in human-readable messages.
pub const LINE_BREAK: &str = "<br />";

const SERVER_ERROR: &str = "Odoo Server Error";
const NOT_FOUND_EXCEPTION: &str = "werkzeug.exceptions.NotFound";
const SESSION_EXPIRED_MESSAGE: &str = "Odoo Session Expired";
const LEGACY_CLIENT_ERROR: &str = "OpenERP WebClient Error";
const LEGACY_SESSION_EXCEPTION: &str = "SessionExpiredException";
const ACCESS_ERROR_NAMES: [&str; 2] = [
    "openerp.exceptions.AccessError",
    "odoo.exceptions.AccessError",
];
const FAULT_SEPARATOR: &str = " -- ";

static DATABASE_MISSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"FATAL:  database "(.+)" does not exist"#).expect("static regex is valid")
});

/// Error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No structured server response (connection failure, non-2xx garbage).
    Transport,
    /// Authentication returned no user id.
    WrongCredentials,
    /// The server session is gone; the stored token has been dropped.
    SessionExpired,
    /// The endpoint does not exist (often a stale session on some servers).
    ResourceNotFound,
    /// The requested database does not exist.
    DatabaseNotFound,
    /// The user may not perform the operation.
    AccessDenied,
    /// Any other server fault, named by its parsed type or raw message.
    ServerFault(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::WrongCredentials => f.write_str("wrong credentials"),
            Self::SessionExpired => f.write_str("session expired"),
            Self::ResourceNotFound => f.write_str("resource not found"),
            Self::DatabaseNotFound => f.write_str("database not found"),
            Self::AccessDenied => f.write_str("access denied"),
            Self::ServerFault(name) => write!(f, "server fault ({})", name),
        }
    }
}

/// A typed error produced from a raw failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Taxonomy bucket.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// The original payload, untouched.
    pub cause: Value,
}

impl ClassifiedError {
    /// Create a classified error.
    pub fn new(kind: ErrorKind, message: impl Into<String>, cause: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            cause,
        }
    }

    /// A failure with no structured server payload.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message, Value::Null)
    }

    /// An authentication response without a user id.
    pub fn wrong_credentials(cause: Value) -> Self {
        Self::new(
            ErrorKind::WrongCredentials,
            "Username and password don't match",
            cause,
        )
    }

    /// Whether the error invalidated the session.
    pub fn is_session_expired(&self) -> bool {
        self.kind == ErrorKind::SessionExpired
    }
}

/// Process-wide session notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The server declared the session expired.
    SessionExpired,
    /// A not-found answer that usually means the session went stale.
    SessionPossiblyStale,
}

/// Side effect requested by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delete the stored session token.
    ClearSession,
    /// Notify session-event subscribers.
    Broadcast(SessionEvent),
}

/// Classifier output: the error plus the side effects to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The classified error.
    pub error: ClassifiedError,
    /// Actions the caller must execute before delivering the error.
    pub actions: Vec<Action>,
}

impl Classification {
    fn plain(error: ClassifiedError) -> Self {
        Self {
            error,
            actions: vec![],
        }
    }
}

/// Classify a raw `error` member of a JSON-RPC response.
///
/// This is a pure function - no side effects.
pub fn classify(raw: &Value) -> Classification {
    let payload = RpcErrorPayload::from_value(raw);
    let data = &payload.data;
    let cause = raw.clone();

    if payload.code == Some(200)
        && payload.message == SERVER_ERROR
        && data.name.as_deref() == Some(NOT_FOUND_EXCEPTION)
    {
        return Classification {
            error: ClassifiedError::new(ErrorKind::ResourceNotFound, "HTTP Error", cause),
            actions: vec![Action::Broadcast(SessionEvent::SessionPossiblyStale)],
        };
    }

    if is_session_expired(&payload) {
        return Classification {
            error: ClassifiedError::new(ErrorKind::SessionExpired, "Session expired", cause),
            actions: vec![
                Action::ClearSession,
                Action::Broadcast(SessionEvent::SessionExpired),
            ],
        };
    }

    if payload.message == SERVER_ERROR {
        if let Some(message) = data.message.as_deref() {
            if DATABASE_MISSING.is_match(message) {
                return Classification::plain(ClassifiedError::new(
                    ErrorKind::DatabaseNotFound,
                    message,
                    cause,
                ));
            }
        }
    }

    if let Some(name) = data.name.as_deref() {
        if ACCESS_ERROR_NAMES.contains(&name) {
            let message = data.message.clone().unwrap_or_default();
            return Classification::plain(ClassifiedError::new(
                ErrorKind::AccessDenied,
                message,
                cause,
            ));
        }
    }

    if let Some((fault_type, rest)) = data.fault_code.as_deref().and_then(split_fault_code) {
        return Classification::plain(ClassifiedError::new(
            ErrorKind::ServerFault(fault_type.to_string()),
            to_line_breaks(rest),
            cause,
        ));
    }

    let debug = data.debug.as_deref().unwrap_or_default();
    Classification::plain(ClassifiedError::new(
        ErrorKind::ServerFault(payload.message.clone()),
        to_line_breaks(debug),
        cause,
    ))
}

fn is_session_expired(payload: &RpcErrorPayload) -> bool {
    let current = payload.code == Some(100) && payload.message == SESSION_EXPIRED_MESSAGE;
    let legacy = payload.code == Some(300)
        && payload.message == LEGACY_CLIENT_ERROR
        && payload
            .data
            .debug
            .as_deref()
            .is_some_and(|debug| debug.contains(LEGACY_SESSION_EXCEPTION));
    current || legacy
}

/// Split `"<Type> -- <rest>"`. Only the first line is searched for the
/// separator; the remainder keeps every following line.
fn split_fault_code(fault_code: &str) -> Option<(&str, &str)> {
    let first_line = fault_code.split('\n').next().unwrap_or_default();
    let (fault_type, _) = first_line.split_once(FAULT_SEPARATOR)?;
    let rest = &fault_code[fault_type.len() + FAULT_SEPARATOR.len()..];
    Some((fault_type, rest))
}

fn to_line_breaks(text: &str) -> String {
    text.replace('\n', LINE_BREAK)
}
