//! Session transmission mode.
//!
//! Some server generations expect the session id echoed inside every request
//! body, others rely on the cookie alone. The mode starts [`SessionMode::Unknown`]
//! and is decided once from the server version reported by the preflight probe.

use serde::{Deserialize, Serialize};

/// How the session id travels with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionMode {
    /// Not negotiated yet. Behaves like [`SessionMode::CookieOnly`].
    #[default]
    Unknown,
    /// The transport's cookie carries the session.
    CookieOnly,
    /// `params.session_id` must also carry the session.
    BodyAndCookie,
}

impl SessionMode {
    /// Decide the mode from a server version string such as `"8.0"` or `"9.0c"`.
    ///
    /// Body-and-cookie is selected only for versions strictly between 8 and 10.
    /// Unparseable versions (e.g. `"saas~11.1"`) fall back to cookie-only.
    pub fn from_server_version(version: &str) -> Self {
        match parse_version_prefix(version) {
            Some(v) if v > 8.0 && v < 10.0 => Self::BodyAndCookie,
            _ => Self::CookieOnly,
        }
    }

    /// Whether a probe has already decided the mode.
    pub fn is_negotiated(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether the session id must be injected into request params.
    pub fn injects_body_session(&self) -> bool {
        matches!(self, Self::BodyAndCookie)
    }
}

/// Parse the leading decimal number of a version string.
///
/// Leading whitespace and an optional sign are accepted; parsing stops at
/// the first character that cannot continue the number, so `"9.0c"` is 9.0.
pub fn parse_version_prefix(version: &str) -> Option<f64> {
    let trimmed = version.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (idx, ch) in trimmed.char_indices() {
        match ch {
            '+' | '-' if idx == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = idx + ch.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    trimmed[..end].trim_end_matches('.').parse().ok()
}
