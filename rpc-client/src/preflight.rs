//! Preflight Negotiator.
//!
//! Decides the [`SessionMode`] with a single version probe per client. While
//! a probe is outstanding every caller awaits the same shared future, so
//! concurrent first calls never issue redundant probes.
//!
//! A failed probe is not an error for the caller: the slot is cleared, the
//! mode stays [`SessionMode::Unknown`] and the next caller probes again.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rpc_core::{ClassifiedError, SessionMode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type ProbeFuture = Shared<BoxFuture<'static, SessionMode>>;

/// Single-flight session mode negotiation.
#[derive(Clone, Default)]
pub struct Negotiator {
    inner: Arc<NegotiatorState>,
}

#[derive(Default)]
struct NegotiatorState {
    mode: Mutex<SessionMode>,
    in_flight: Mutex<Option<ProbeFuture>>,
    probes: AtomicU64,
}

impl std::fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiator")
            .field("mode", &self.mode())
            .field("probes_started", &self.probes_started())
            .finish()
    }
}

impl Negotiator {
    /// Create an un-negotiated negotiator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode.
    pub fn mode(&self) -> SessionMode {
        *self.inner.mode.lock()
    }

    /// Number of probes started so far.
    pub fn probes_started(&self) -> u64 {
        self.inner.probes.load(Ordering::SeqCst)
    }

    /// Return the negotiated mode, probing at most once at a time.
    ///
    /// `probe` is only invoked when no mode is known and no probe is in
    /// flight. It resolves to the server version string.
    pub async fn ensure_negotiated<F>(&self, probe: F) -> SessionMode
    where
        F: FnOnce() -> BoxFuture<'static, Result<String, ClassifiedError>>,
    {
        let pending = {
            let mut slot = self.inner.in_flight.lock();
            let mode = *self.inner.mode.lock();
            if mode.is_negotiated() {
                return mode;
            }
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    self.inner.probes.fetch_add(1, Ordering::SeqCst);
                    let pending = Self::start_probe(Arc::clone(&self.inner), probe());
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn start_probe(
        state: Arc<NegotiatorState>,
        probe: BoxFuture<'static, Result<String, ClassifiedError>>,
    ) -> ProbeFuture {
        async move {
            let outcome = probe.await;
            let mut slot = state.in_flight.lock();
            let mut mode = state.mode.lock();
            match outcome {
                Ok(version) => {
                    *mode = SessionMode::from_server_version(&version);
                    tracing::info!("Server version {} negotiated as {:?}", version, *mode);
                }
                Err(e) => {
                    tracing::warn!("Version probe failed, will retry on next call: {}", e);
                }
            }
            *slot = None;
            *mode
        }
        .boxed()
        .shared()
    }
}
