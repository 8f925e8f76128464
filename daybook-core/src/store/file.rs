//! Directory-backed store.
//!
//! ```text
//! <data_dir>/
//!   items/<encoded item id>.json
//!   fired.log                      one JSON reminder key per line
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{FiredLog, ItemRepository, StoredItem, sorted_offsets};
use crate::error::{CoreError, CoreResult};
use crate::item::CanonicalItem;
use crate::reminder::{ReminderKey, ReminderOffset};

const ITEMS_DIR: &str = "items";
const FIRED_LOG_FILE: &str = "fired.log";

pub struct FileStore {
    root: PathBuf,
    // Serializes writers within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(ITEMS_DIR))?;

        Ok(FileStore {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn items_dir(&self) -> PathBuf {
        self.root.join(ITEMS_DIR)
    }

    fn item_path(&self, id: &str) -> PathBuf {
        self.items_dir().join(format!("{}.json", encode_filename(id)))
    }

    fn read_stored(&self, path: &Path) -> CoreResult<StoredItem> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn load(&self, id: &str) -> CoreResult<Option<StoredItem>> {
        let path = self.item_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_stored(&path).map(Some)
    }

    fn save(&self, stored: &StoredItem) -> CoreResult<()> {
        let path = self.item_path(&stored.item.id);
        let temp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(stored)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }
}

impl ItemRepository for FileStore {
    fn items(&self) -> CoreResult<Vec<CanonicalItem>> {
        let entries = std::fs::read_dir(self.items_dir())?;

        let mut items: Vec<CanonicalItem> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| match self.read_stored(&path) {
                Ok(stored) => Some(stored.item),
                Err(e) => {
                    log::warn!("Skipping unreadable item file: {}", e);
                    None
                }
            })
            .collect();

        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    fn item(&self, id: &str) -> CoreResult<Option<CanonicalItem>> {
        Ok(self.load(id)?.map(|s| s.item))
    }

    fn upsert(&self, item: CanonicalItem) -> CoreResult<()> {
        item.validate()?;

        let _guard = self.write_lock.lock();
        let reminder_offsets = self.load(&item.id)?.and_then(|s| s.reminder_offsets);
        self.save(&StoredItem {
            item,
            reminder_offsets,
        })
    }

    fn remove(&self, id: &str) -> CoreResult<bool> {
        let _guard = self.write_lock.lock();
        let path = self.item_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }

    fn reminder_offsets(&self, item_id: &str) -> CoreResult<Option<Vec<ReminderOffset>>> {
        Ok(self.load(item_id)?.and_then(|s| s.reminder_offsets))
    }

    fn set_reminder_offsets(&self, item_id: &str, offsets: Vec<ReminderOffset>) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut stored = self
            .load(item_id)?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        stored.reminder_offsets = Some(sorted_offsets(offsets));
        self.save(&stored)
    }
}

impl FiredLog for FileStore {
    fn fired_keys(&self) -> CoreResult<Vec<ReminderKey>> {
        let path = self.root.join(FIRED_LOG_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let keys = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(key) => Some(key),
                // A torn final line from a crash mid-append
                Err(e) => {
                    log::warn!("Ignoring bad fired.log line '{}': {}", line, e);
                    None
                }
            })
            .collect();
        Ok(keys)
    }

    fn append(&self, key: &ReminderKey) -> CoreResult<()> {
        let line =
            serde_json::to_string(key).map_err(|e| CoreError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(FIRED_LOG_FILE))?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Make an item id safe to use as a file name.
///
/// Alphanumerics, `-`, `_` and `.` pass through; everything else becomes
/// `~XX` per byte, so distinct ids never share a file.
fn encode_filename(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("~{:02X}", byte)),
        }
    }
    out
}
