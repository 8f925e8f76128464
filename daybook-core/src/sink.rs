//! Outbound notifications for fired reminders.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::reminder::Reminder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub item_id: String,
    pub occurrence_start: DateTime<Utc>,
    pub title: String,
    pub fire_at: DateTime<Utc>,
}

impl From<&Reminder> for Notification {
    fn from(reminder: &Reminder) -> Self {
        Notification {
            item_id: reminder.item_id.clone(),
            occurrence_start: reminder.occurrence_start,
            title: reminder.title.clone(),
            fire_at: reminder.fire_at,
        }
    }
}

/// Where fired reminders are handed off to. Must not block.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> CoreResult<()>;
}

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, notification: &Notification) -> CoreResult<()> {
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}
