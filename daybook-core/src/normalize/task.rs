use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Normalize, SourceContext, date_to_utc, non_empty, unknown_modification};
use crate::error::NormalizationError;
use crate::item::{CanonicalItem, ItemKind};

/// Google Tasks task resource.
///
/// The Tasks API only keeps the date part of `due`; the time is always
/// midnight UTC and is discarded here in favour of local midnight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub due: Option<String>,
    /// "needsAction" or "completed"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

impl GoogleTask {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    fn due_date(&self) -> Result<NaiveDate, NormalizationError> {
        let due = self
            .due
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(NormalizationError::MissingField("start"))?;

        due.get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| NormalizationError::InvalidDateTime {
                field: "due",
                value: due.to_string(),
            })
    }
}

impl Normalize for GoogleTask {
    fn normalize(&self, source: &SourceContext) -> Result<CanonicalItem, NormalizationError> {
        let title = non_empty(&self.title).ok_or(NormalizationError::MissingField("title"))?;
        let date = self.due_date()?;
        let start = date_to_utc(date, source.timezone).ok_or_else(|| {
            NormalizationError::InvalidDateTime {
                field: "due",
                value: date.to_string(),
            }
        })?;

        Ok(CanonicalItem {
            id: CanonicalItem::qualified_id(&source.source_id, &self.id),
            kind: ItemKind::Task,
            title,
            description: non_empty(&self.notes),
            location: None,
            start,
            end: None,
            timezone: source.timezone,
            recurrence: None,
            source_id: source.source_id.clone(),
            source_priority: source.source_priority,
            last_modified: self.updated.unwrap_or_else(unknown_modification),
        })
    }

    fn native_id(&self) -> &str {
        &self.id
    }

    fn is_cancelled(&self) -> bool {
        self.deleted
    }
}
