//! # rpc-core
//!
//! Pure logic for odoo-rpc (no I/O, instant tests).
//!
//! This crate implements the decisions the client makes without performing
//! any network or storage I/O:
//! - [`SessionMode`] - how the session id is transmitted, from the server version
//! - [`classify`] - mapping raw server error payloads to [`ClassifiedError`]
//! - [`SyncState`] - applying paginated deltas to a local dataset
//! - [`merge_context`] - combining session and caller request contexts
//!
//! ## Design Philosophy
//!
//! The classifier does not clear sessions or broadcast events itself. It
//! returns the [`Action`]s the caller must perform, the same way a state
//! machine returns actions for its interpreter. `rpc-client` interprets them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod context;
pub mod dataset;
pub mod mode;

pub use classify::{classify, Action, Classification, ClassifiedError, ErrorKind, SessionEvent};
pub use context::merge_context;
pub use dataset::{deep_merge, Dataset, PageBudget, PageOutcome, SyncState};
pub use mode::{parse_version_prefix, SessionMode};
