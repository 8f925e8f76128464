//! Memoized expansions.
//!
//! Occurrences are never persisted. Expansions are cached per
//! `(item id, last_modified, window)`, so an edited item misses the cache on
//! its own; [`OccurrenceCache::invalidate`] covers items whose modification
//! time is unknown.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::CoreResult;
use crate::item::CanonicalItem;
use crate::occurrence::Occurrence;
use crate::recurrence::{ExpansionLimits, expand_with_limits};
use crate::window::Window;

const MAX_ENTRIES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    item_id: String,
    last_modified: DateTime<Utc>,
    window: Window,
}

#[derive(Debug)]
pub struct OccurrenceCache {
    limits: ExpansionLimits,
    entries: Mutex<HashMap<CacheKey, Vec<Occurrence>>>,
}

impl OccurrenceCache {
    pub fn new(limits: ExpansionLimits) -> Self {
        OccurrenceCache {
            limits,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Occurrences of `item` in `window`, expanding on a miss.
    ///
    /// Failed expansions are not cached.
    pub fn occurrences(&self, item: &CanonicalItem, window: &Window) -> CoreResult<Vec<Occurrence>> {
        let key = CacheKey {
            item_id: item.id.clone(),
            last_modified: item.last_modified,
            window: *window,
        };

        if let Some(hit) = self.entries.lock().get(&key) {
            return Ok(hit.clone());
        }

        // Expand without holding the lock
        let occurrences: Vec<Occurrence> = expand_with_limits(item, window, self.limits)?.collect();

        let mut entries = self.entries.lock();
        entries.retain(|k, _| k.item_id != item.id || k.last_modified == item.last_modified);
        if entries.len() >= MAX_ENTRIES {
            log::debug!("Occurrence cache full, clearing {} entries", entries.len());
            entries.clear();
        }
        entries.insert(key, occurrences.clone());

        Ok(occurrences)
    }

    pub fn invalidate(&self, item_id: &str) {
        self.entries.lock().retain(|k, _| k.item_id != item_id);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OccurrenceCache {
    fn default() -> Self {
        Self::new(ExpansionLimits::default())
    }
}
