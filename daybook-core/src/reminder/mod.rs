//! Reminders attached to occurrences and the scheduler that fires them.

mod scheduler;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::occurrence::Occurrence;

pub use scheduler::{ReconcileReport, ReminderScheduler};

/// Lead time before an occurrence, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderOffset(i64);

impl ReminderOffset {
    /// Used when neither the item nor the config names any offsets.
    pub const DEFAULT: ReminderOffset = ReminderOffset(10);

    pub fn minutes(minutes: i64) -> CoreResult<Self> {
        if minutes < 0 {
            return Err(CoreError::InvalidOffset(format!(
                "{} minutes is negative",
                minutes
            )));
        }
        Ok(ReminderOffset(minutes))
    }

    pub fn as_minutes(&self) -> i64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.0)
    }
}

impl FromStr for ReminderOffset {
    type Err = CoreError;

    /// Humantime strings such as `10m`, `1h 30m` or `2days`.
    fn from_str(s: &str) -> CoreResult<Self> {
        let duration = humantime::parse_duration(s.trim())
            .map_err(|e| CoreError::InvalidOffset(format!("'{}': {}", s, e)))?;

        let secs = duration.as_secs();
        if secs % 60 != 0 || duration.subsec_nanos() != 0 {
            return Err(CoreError::InvalidOffset(format!(
                "'{}' is not a whole number of minutes",
                s
            )));
        }
        let minutes = i64::try_from(secs / 60)
            .map_err(|_| CoreError::InvalidOffset(format!("'{}' is too large", s)))?;
        Self::minutes(minutes)
    }
}

impl fmt::Display for ReminderOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.0;
        if minutes != 0 && minutes % (24 * 60) == 0 {
            write!(f, "{}d", minutes / (24 * 60))
        } else if minutes != 0 && minutes % 60 == 0 {
            write!(f, "{}h", minutes / 60)
        } else {
            write!(f, "{}m", minutes)
        }
    }
}

/// Identity of a reminder; also the key of the fired log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub item_id: String,
    pub occurrence_start: DateTime<Utc>,
    pub offset_minutes: i64,
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}-{}m",
            self.item_id,
            self.occurrence_start.to_rfc3339(),
            self.offset_minutes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    Pending,
    /// Terminal
    Fired,
    /// Terminal
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub item_id: String,
    pub occurrence_start: DateTime<Utc>,
    pub offset: ReminderOffset,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    /// `last_modified` of the item the reminder was planned from
    pub item_version: DateTime<Utc>,
    pub state: ReminderState,
}

impl Reminder {
    /// A pending reminder `offset` before the occurrence starts.
    pub fn plan(occurrence: &Occurrence, offset: ReminderOffset) -> Self {
        Reminder {
            item_id: occurrence.item_id.clone(),
            occurrence_start: occurrence.occurrence_start,
            offset,
            fire_at: occurrence.occurrence_start - offset.as_duration(),
            title: occurrence.title().to_string(),
            item_version: occurrence.data.last_modified,
            state: ReminderState::Pending,
        }
    }

    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            item_id: self.item_id.clone(),
            occurrence_start: self.occurrence_start,
            offset_minutes: self.offset.as_minutes(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ReminderState::Pending
    }
}

impl fmt::Display for Reminder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} before)", self.title, self.offset)
    }
}
