//! Session token storage.
//!
//! The client reads the token on every call and writes it on login, logout
//! and detected expiry. Applications that persist sessions across restarts
//! (keychain, cookie jar, file) implement [`SessionStore`]; the default is an
//! in-memory store.

use parking_lot::Mutex;
use rpc_types::SessionToken;

/// Durable holder for the current session token.
///
/// Implementations must be cheap to call: the client reads the token on
/// every request.
pub trait SessionStore: Send + Sync {
    /// Current token, if any.
    fn get(&self) -> Option<SessionToken>;

    /// Replace the token.
    fn set(&self, token: SessionToken);

    /// Forget the token.
    fn delete(&self);
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<SessionToken>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a token (resumed session).
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<SessionToken> {
        self.token.lock().clone()
    }

    fn set(&self, token: SessionToken) {
        *self.token.lock() = Some(token);
    }

    fn delete(&self) {
        *self.token.lock() = None;
    }
}
