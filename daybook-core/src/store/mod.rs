//! Persisted state: canonical items with their reminder offsets, and the
//! append-only log of fired reminders.

mod file;
mod memory;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::item::CanonicalItem;
use crate::reminder::{ReminderKey, ReminderOffset};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Canonical items keyed by id.
pub trait ItemRepository: Send + Sync {
    /// All items, ordered by id.
    fn items(&self) -> CoreResult<Vec<CanonicalItem>>;

    fn item(&self, id: &str) -> CoreResult<Option<CanonicalItem>>;

    /// Insert or replace an item. Invalid items (and rules) are rejected here,
    /// before they can reach expansion. Existing reminder offsets are kept.
    fn upsert(&self, item: CanonicalItem) -> CoreResult<()>;

    /// Returns whether the item existed.
    fn remove(&self, id: &str) -> CoreResult<bool>;

    /// Per-item offsets; `None` when the item uses the configured defaults.
    fn reminder_offsets(&self, item_id: &str) -> CoreResult<Option<Vec<ReminderOffset>>>;

    /// Fails with `ItemNotFound` for unknown items.
    fn set_reminder_offsets(&self, item_id: &str, offsets: Vec<ReminderOffset>) -> CoreResult<()>;
}

/// Append-only record of reminders that have fired.
pub trait FiredLog: Send + Sync {
    fn fired_keys(&self) -> CoreResult<Vec<ReminderKey>>;

    fn append(&self, key: &ReminderKey) -> CoreResult<()>;
}

/// On-disk/in-memory record of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredItem {
    pub item: CanonicalItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_offsets: Option<Vec<ReminderOffset>>,
}

fn sorted_offsets(mut offsets: Vec<ReminderOffset>) -> Vec<ReminderOffset> {
    offsets.sort();
    offsets.dedup();
    offsets
}
