//! Local dataset maintenance for incremental sync.
//!
//! A sync session owns a dataset keyed by record id and a watermark. Each
//! page from the server removes some records and deep-merges changed ones:
//! existing records are updated field by field, so partial updates from
//! different pages compose.
//!
//! Draining a burst of changes is bounded by a [`PageBudget`] so a server that
//! never reports an empty page cannot starve the tick schedule.

use rpc_types::{RecordId, SyncPage, Watermark};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Records of a synchronized model, keyed by id.
pub type Dataset = BTreeMap<RecordId, Value>;

/// What a page means for the current drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page changed records; request the next one immediately.
    More,
    /// The page reported no changed records; the burst is drained.
    Settled,
}

/// Watermark plus dataset of one sync session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// Resume point for the next pull (`None` before the first page).
    pub watermark: Option<Watermark>,
    /// Current records.
    pub dataset: Dataset,
}

impl SyncState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one page: removals first, then merges, then the watermark.
    ///
    /// A page without a watermark keeps the current one.
    pub fn apply_page(&mut self, page: SyncPage) -> PageOutcome {
        for raw in &page.remove_ids {
            if let Some(id) = RecordId::from_value(raw) {
                self.dataset.remove(&id);
            }
        }

        let outcome = if page.data.is_empty() {
            PageOutcome::Settled
        } else {
            PageOutcome::More
        };

        for (key, incoming) in page.data {
            match self.dataset.entry(RecordId::new(key)) {
                Entry::Occupied(mut existing) => deep_merge(existing.get_mut(), incoming),
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
            }
        }

        if let Some(watermark) = page.watermark {
            self.watermark = Some(watermark);
        }

        outcome
    }
}

/// Merge `incoming` into `target`.
///
/// Objects merge key by key, recursively. Any other value (including arrays)
/// replaces the target.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Upper bound on pages requested in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudget {
    max_pages: u32,
    pages: u32,
}

impl PageBudget {
    /// Allow up to `max_pages` requests (at least one).
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
            pages: 0,
        }
    }

    /// Reserve one page request. Returns `false` once the budget is spent.
    pub fn try_take(&mut self) -> bool {
        if self.pages >= self.max_pages {
            return false;
        }
        self.pages += 1;
        true
    }

    /// Pages requested so far.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Whether no further page may be requested.
    pub fn is_exhausted(&self) -> bool {
        self.pages >= self.max_pages
    }
}
