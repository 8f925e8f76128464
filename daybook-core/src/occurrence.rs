//! Materialized instances of canonical items.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{CanonicalItem, ItemKind};

/// One concrete instance of a (possibly recurring) item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub item_id: String,
    /// Instant the rule generated (override lookup key). Stable across edits.
    pub original_start: DateTime<Utc>,
    pub occurrence_start: DateTime<Utc>,
    /// Equals `occurrence_start` for tasks without an end
    pub occurrence_end: DateTime<Utc>,
    /// Effective record for this instance, with any override applied
    pub data: CanonicalItem,
}

impl Occurrence {
    /// The single occurrence of a non-recurring item.
    pub fn single(item: &CanonicalItem) -> Self {
        let mut data = item.clone();
        data.recurrence = None;

        Occurrence {
            item_id: item.id.clone(),
            original_start: item.start,
            occurrence_start: item.start,
            occurrence_end: item.end.unwrap_or(item.start),
            data,
        }
    }

    /// Unique id of this occurrence: item id plus original instant.
    pub fn id(&self) -> String {
        format!("{}@{}", self.item_id, self.original_start.to_rfc3339())
    }

    pub fn kind(&self) -> ItemKind {
        self.data.kind
    }

    pub fn title(&self) -> &str {
        &self.data.title
    }

    pub fn source_id(&self) -> &str {
        &self.data.source_id
    }

    pub fn source_priority(&self) -> i32 {
        self.data.source_priority
    }

    pub fn duration(&self) -> Duration {
        self.occurrence_end - self.occurrence_start
    }

    pub fn is_well_formed(&self) -> bool {
        self.occurrence_end >= self.occurrence_start
    }

    /// Whether this instance was edited or moved away from its rule instant.
    pub fn is_moved(&self) -> bool {
        self.original_start != self.occurrence_start
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.data.title, self.occurrence_start.to_rfc3339())
    }
}
