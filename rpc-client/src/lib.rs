//! # rpc-client
//!
//! Session-aware JSON-RPC client for Odoo/OpenERP style servers.
//!
//! This is the main library that applications use to talk to the server.
//!
//! ## Features
//!
//! - **Version-Adaptive Sessions**: One version probe per client decides whether
//!   the session id travels in request bodies
//! - **Typed Errors**: HTTP-200 error payloads become [`ClassifiedError`]s, with
//!   session invalidation and [`SessionEvent`] broadcast where the kind demands
//! - **Incremental Sync**: Watermark-driven delta pulls merged into a local dataset
//! - **Transport Abstraction**: Pluggable transport layer (application HTTP stack, mock)
//!
//! ## Example
//!
//! ```ignore
//! use odoo_rpc_client::{ClientConfig, RpcClient, SyncConfig};
//!
//! let config = ClientConfig::from_file(Path::new("client.toml"))?;
//! let client = RpcClient::new(config, transport);
//!
//! client.login("acme", "bob", "secret").await?;
//!
//! let sync = client.start_sync(SyncConfig::new("res.partner", "partners"));
//! sync.watch(|snapshot| println!("{} partners", snapshot.dataset.len()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod preflight;
pub mod session;
pub mod sync;
pub mod transport;

pub use client::{ErrorInterceptor, RpcClient, SearchRead};
pub use config::{ClientConfig, ConfigError, PollingConfig, ServerConfig, SyncSettings};
pub use envelope::{Envelope, EnvelopeBuilder, CORRELATION_HEADER, SESSION_HEADER};
pub use preflight::Negotiator;
pub use session::{MemorySessionStore, SessionStore};
pub use sync::{
    DeltaSource, RetryCallback, RetryPolicy, SyncConfig, SyncHandle, SyncSnapshot, Watcher,
    SYNC_METHOD,
};
pub use transport::{HttpRequest, HttpResponse, MockReply, MockTransport, Transport, TransportError};

pub use rpc_core::{ClassifiedError, ErrorKind, SessionEvent, SessionMode};
