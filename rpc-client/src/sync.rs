//! Incremental sync engine.
//!
//! A sync session repeatedly pulls pages of changes from a [`DeltaSource`]
//! starting at the current watermark, applies them to a local dataset and
//! reschedules itself. Each tick drains the current burst of changes before
//! notifying watchers, so watchers see one settled state per burst.
//!
//! # Scheduling
//!
//! At most one tick per session is armed or in flight. Within a tick pages
//! are requested strictly one after another, and the drain is bounded by
//! `max_pages_per_tick`; a source that never settles is resumed on the next
//! tick instead of starving the schedule.
//!
//! Errors never trigger a retry unless the session's [`RetryPolicy`] asks for
//! one.

use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_core::{ClassifiedError, Dataset, PageBudget, PageOutcome, SyncState};
use rpc_types::{SyncPage, SyncPageRequest, Watermark};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncSettings;

/// Server model method returning sync pages.
pub const SYNC_METHOD: &str = "get_sync_data";

/// Callback deciding what happens after a failed tick.
pub type RetryCallback = Arc<dyn Fn(&SyncHandle, &ClassifiedError) + Send + Sync>;

/// Callback invoked with the settled state after every tick.
pub type Watcher = Arc<dyn Fn(&SyncSnapshot) + Send + Sync>;

/// What to do when a tick fails.
#[derive(Clone, Default)]
pub enum RetryPolicy {
    /// Stop ticking until the caller reschedules manually.
    #[default]
    Stall,
    /// Reschedule after the standard interval.
    Always,
    /// Hand the error to a callback, which may call
    /// [`SyncHandle::schedule_next_tick`].
    Custom(RetryCallback),
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stall => f.write_str("Stall"),
            Self::Always => f.write_str("Always"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Configuration of one sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Model to synchronize.
    pub model: String,
    /// Server-side key selecting the export function.
    pub function_key: String,
    /// Domain every record must match.
    pub base_domain: Value,
    /// Additional domain narrowing the delta.
    pub filter_domain: Value,
    /// Records per page.
    pub page_limit: u32,
    /// Delay between settled ticks.
    pub tick_interval: Duration,
    /// Pages drained in one tick before yielding.
    pub max_pages_per_tick: u32,
    /// Error handling.
    pub on_error_retry: RetryPolicy,
}

impl SyncConfig {
    /// Create a session configuration with default settings.
    pub fn new(model: &str, function_key: &str) -> Self {
        Self::from_settings(model, function_key, &SyncSettings::default())
    }

    /// Create a session configuration from configured defaults.
    pub fn from_settings(model: &str, function_key: &str, settings: &SyncSettings) -> Self {
        Self {
            model: model.to_string(),
            function_key: function_key.to_string(),
            base_domain: json!([]),
            filter_domain: json!([]),
            page_limit: settings.page_limit,
            tick_interval: settings.tick_interval(),
            max_pages_per_tick: settings.max_pages_per_tick,
            on_error_retry: RetryPolicy::Stall,
        }
    }

    /// Set the base domain.
    pub fn with_base_domain(mut self, domain: Value) -> Self {
        self.base_domain = domain;
        self
    }

    /// Set the incremental filter domain.
    pub fn with_filter_domain(mut self, domain: Value) -> Self {
        self.filter_domain = domain;
        self
    }

    /// Set the page size.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the drain guard.
    pub fn with_max_pages_per_tick(mut self, max_pages: u32) -> Self {
        self.max_pages_per_tick = max_pages;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.on_error_retry = policy;
        self
    }

    /// Use a callback as the retry policy.
    pub fn with_retry_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&SyncHandle, &ClassifiedError) + Send + Sync + 'static,
    {
        self.with_retry(RetryPolicy::Custom(Arc::new(callback)))
    }
}

/// Where sync pages come from.
///
/// [`RpcClient`](crate::RpcClient) implements this by calling
/// [`SYNC_METHOD`] on the model.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Pull one page of changes since `request.watermark`.
    async fn pull_page(&self, request: &SyncPageRequest) -> Result<SyncPage, ClassifiedError>;
}

/// Copy of a session's state handed to watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    /// Current watermark.
    pub watermark: Option<Watermark>,
    /// Current records.
    pub dataset: Dataset,
}

/// Handle to a running sync session.
///
/// Cloning is cheap; all clones control the same session.
#[derive(Clone)]
pub struct SyncHandle {
    shared: Arc<SyncShared>,
}

struct SyncShared {
    source: Arc<dyn DeltaSource>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    cancelled: AtomicBool,
    armed: AtomicBool,
    watchers: Mutex<Vec<Watcher>>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("model", &self.shared.config.model)
            .field("records", &self.shared.state.lock().dataset.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl SyncHandle {
    /// Start a session with an empty dataset. The first tick runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(source: Arc<dyn DeltaSource>, config: SyncConfig) -> Self {
        Self::resume(source, config, SyncState::new())
    }

    /// Start a session from a previously saved watermark and dataset.
    pub fn resume(source: Arc<dyn DeltaSource>, config: SyncConfig, state: SyncState) -> Self {
        tracing::info!(
            "Starting sync of {} (interval: {:?})",
            config.model,
            config.tick_interval
        );
        let handle = Self {
            shared: Arc::new(SyncShared {
                source,
                config,
                state: Mutex::new(state),
                cancelled: AtomicBool::new(false),
                armed: AtomicBool::new(false),
                watchers: Mutex::new(Vec::new()),
            }),
        };
        handle.schedule_next_tick(Some(Duration::ZERO));
        handle
    }

    /// Stop scheduling ticks. A page already in flight is discarded.
    pub fn cancel(&self) {
        if !self.shared.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Sync of {} cancelled", self.shared.config.model);
        }
    }

    /// Whether the session was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Register a watcher, called after every settled tick.
    pub fn watch<F>(&self, watcher: F)
    where
        F: Fn(&SyncSnapshot) + Send + Sync + 'static,
    {
        self.shared.watchers.lock().push(Arc::new(watcher));
    }

    /// Arm the next tick after `delay` (default: the tick interval).
    ///
    /// Returns `false` without arming when the session is cancelled or a tick
    /// is already armed or in flight.
    pub fn schedule_next_tick(&self, delay: Option<Duration>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if self.shared.armed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Sync of {} already has a tick armed", self.shared.config.model);
            return false;
        }

        let delay = delay.unwrap_or(self.shared.config.tick_interval);
        let handle = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            handle.run_tick().await;
        });
        true
    }

    /// Current watermark and dataset.
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.shared.state.lock();
        SyncSnapshot {
            watermark: state.watermark.clone(),
            dataset: state.dataset.clone(),
        }
    }

    /// Current records.
    pub fn dataset(&self) -> Dataset {
        self.shared.state.lock().dataset.clone()
    }

    /// Current watermark.
    pub fn watermark(&self) -> Option<Watermark> {
        self.shared.state.lock().watermark.clone()
    }

    async fn run_tick(&self) {
        let outcome = self.drain().await;
        self.shared.armed.store(false, Ordering::SeqCst);

        if self.is_cancelled() {
            tracing::debug!("Sync of {} finished a tick after cancel", self.shared.config.model);
            return;
        }

        match outcome {
            Ok(pages) => {
                tracing::debug!("Sync of {} settled after {} pages", self.shared.config.model, pages);
                self.schedule_next_tick(None);
                self.notify_watchers();
            }
            Err(error) => self.handle_error(error),
        }
    }

    /// Pull pages until one settles, the budget runs out or the session is cancelled.
    async fn drain(&self) -> Result<u32, ClassifiedError> {
        let config = &self.shared.config;
        let mut budget = PageBudget::new(config.max_pages_per_tick);

        loop {
            if self.is_cancelled() {
                break;
            }
            if !budget.try_take() {
                tracing::warn!(
                    "Sync of {} pulled {} pages without settling, resuming next tick",
                    config.model,
                    budget.pages()
                );
                break;
            }

            let request = SyncPageRequest {
                model: config.model.clone(),
                function_key: config.function_key.clone(),
                base_domain: config.base_domain.clone(),
                filter_domain: config.filter_domain.clone(),
                limit: config.page_limit,
                watermark: self.watermark(),
            };
            let page = self.shared.source.pull_page(&request).await?;

            if self.is_cancelled() {
                tracing::debug!("Discarding page for cancelled sync of {}", config.model);
                break;
            }
            let outcome = self.shared.state.lock().apply_page(page);
            if outcome == PageOutcome::Settled {
                break;
            }
        }

        Ok(budget.pages())
    }

    fn handle_error(&self, error: ClassifiedError) {
        let model = &self.shared.config.model;
        match &self.shared.config.on_error_retry {
            RetryPolicy::Stall => {
                tracing::warn!("Sync of {} stalled: {}", model, error);
            }
            RetryPolicy::Always => {
                tracing::warn!("Sync of {} failed, retrying next interval: {}", model, error);
                self.schedule_next_tick(None);
            }
            RetryPolicy::Custom(callback) => {
                tracing::debug!("Sync of {} failed, consulting retry callback: {}", model, error);
                callback(self, &error);
            }
        }
    }

    fn notify_watchers(&self) {
        let watchers = self.shared.watchers.lock().clone();
        if watchers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for watcher in &watchers {
            // A watcher may cancel the session; later watchers must not see the snapshot.
            if self.is_cancelled() {
                tracing::debug!("Sync of {} cancelled while notifying watchers", self.shared.config.model);
                return;
            }
            watcher(&snapshot);
        }
    }
}
