//! # rpc-types
//!
//! Wire format types for the odoo-rpc JSON-RPC client.
//!
//! This crate provides the foundational types used across all odoo-rpc crates:
//! - [`RequestId`], [`SessionToken`], [`Watermark`] - Identity and ordering types
//! - [`RpcRequest`], [`RpcResponse`], [`RpcErrorPayload`] - The JSON-RPC envelope
//! - [`LoginResult`], [`SessionInfo`], [`VersionInfo`], [`SyncPage`] - Typed results
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::{ErrorData, RpcErrorPayload, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use error::TypesError;
pub use ids::{RecordId, RequestId, SessionToken, Watermark};
pub use messages::{
    LoginResult, ProxyAction, ProxyResult, SessionInfo, SyncPage, SyncPageRequest, VersionInfo,
    PROXY_ACTION_TYPE,
};
