use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{FiredLog, ItemRepository, StoredItem, sorted_offsets};
use crate::error::{CoreError, CoreResult};
use crate::item::CanonicalItem;
use crate::reminder::{ReminderKey, ReminderOffset};

/// In-process store, used by tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, StoredItem>>,
    fired: Mutex<Vec<ReminderKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemRepository for MemoryStore {
    fn items(&self) -> CoreResult<Vec<CanonicalItem>> {
        Ok(self.items.lock().values().map(|s| s.item.clone()).collect())
    }

    fn item(&self, id: &str) -> CoreResult<Option<CanonicalItem>> {
        Ok(self.items.lock().get(id).map(|s| s.item.clone()))
    }

    fn upsert(&self, item: CanonicalItem) -> CoreResult<()> {
        item.validate()?;

        let mut items = self.items.lock();
        let reminder_offsets = items.get(&item.id).and_then(|s| s.reminder_offsets.clone());
        items.insert(
            item.id.clone(),
            StoredItem {
                item,
                reminder_offsets,
            },
        );
        Ok(())
    }

    fn remove(&self, id: &str) -> CoreResult<bool> {
        Ok(self.items.lock().remove(id).is_some())
    }

    fn reminder_offsets(&self, item_id: &str) -> CoreResult<Option<Vec<ReminderOffset>>> {
        Ok(self
            .items
            .lock()
            .get(item_id)
            .and_then(|s| s.reminder_offsets.clone()))
    }

    fn set_reminder_offsets(&self, item_id: &str, offsets: Vec<ReminderOffset>) -> CoreResult<()> {
        let mut items = self.items.lock();
        let stored = items
            .get_mut(item_id)
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        stored.reminder_offsets = Some(sorted_offsets(offsets));
        Ok(())
    }
}

impl FiredLog for MemoryStore {
    fn fired_keys(&self) -> CoreResult<Vec<ReminderKey>> {
        Ok(self.fired.lock().clone())
    }

    fn append(&self, key: &ReminderKey) -> CoreResult<()> {
        self.fired.lock().push(key.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::make_test_item;
    use crate::recurrence::{Frequency, RecurrenceRule};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_upsert_rejects_invalid_rule() {
        let store = MemoryStore::new();
        let mut item = make_test_item("local:bad", Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(), 30);
        item.recurrence = Some(RecurrenceRule::new(Frequency::Daily).every(0));

        assert!(matches!(store.upsert(item), Err(CoreError::InvalidRule(_))));
        assert!(store.items().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_keeps_reminder_offsets() {
        let store = MemoryStore::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        store.upsert(make_test_item("local:a", start, 30)).unwrap();
        store
            .set_reminder_offsets("local:a", vec![ReminderOffset::minutes(5).unwrap()])
            .unwrap();

        let mut edited = make_test_item("local:a", start, 45);
        edited.title = "Edited".into();
        store.upsert(edited).unwrap();

        assert_eq!(store.item("local:a").unwrap().unwrap().title, "Edited");
        assert_eq!(
            store.reminder_offsets("local:a").unwrap(),
            Some(vec![ReminderOffset::minutes(5).unwrap()])
        );
    }

    #[test]
    fn test_offsets_for_unknown_item() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_reminder_offsets("nope", vec![]),
            Err(CoreError::ItemNotFound(_))
        ));
        assert_eq!(store.reminder_offsets("nope").unwrap(), None);
    }
}
