use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Normalize, SourceContext, non_empty, parse_instant, resolve_timezone, unknown_modification,
};
use crate::error::NormalizationError;
use crate::item::{CanonicalItem, ItemKind};
use crate::recurrence::RecurrenceRule;

fn default_kind() -> ItemKind {
    ItemKind::Event
}

/// A record authored in daybook itself.
///
/// Times are RFC 3339 or naive (`2024-01-15T09:00`), the latter read in
/// `timezone` or the source's zone. The recurrence is daybook's own rule shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalItem {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: ItemKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl Normalize for LocalItem {
    fn normalize(&self, source: &SourceContext) -> Result<CanonicalItem, NormalizationError> {
        let title = non_empty(&self.title).ok_or(NormalizationError::MissingField("title"))?;
        let timezone = resolve_timezone(self.timezone.as_deref(), source);

        let start = self
            .start
            .as_deref()
            .ok_or(NormalizationError::MissingField("start"))
            .and_then(|s| parse_instant("start", s, timezone))?;
        let end = self
            .end
            .as_deref()
            .map(|s| parse_instant("end", s, timezone))
            .transpose()?;

        Ok(CanonicalItem {
            id: CanonicalItem::qualified_id(&source.source_id, &self.id),
            kind: self.kind,
            title,
            description: non_empty(&self.description),
            location: non_empty(&self.location),
            start,
            end,
            timezone,
            recurrence: self.recurrence.clone(),
            source_id: source.source_id.clone(),
            source_priority: source.source_priority,
            last_modified: self.updated.unwrap_or_else(unknown_modification),
        })
    }

    fn native_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{ProviderPayload, normalize};
    use chrono::TimeZone;

    fn source() -> SourceContext {
        SourceContext::new("local", 0, chrono_tz::Europe::London)
    }

    fn payload(json: serde_json::Value) -> ProviderPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_local_recurring_item() {
        let item = normalize(
            &payload(serde_json::json!({
                "provider": "local",
                "id": "yoga",
                "title": "Yoga",
                "start": "2024-06-03T07:00",
                "end": "2024-06-03T08:00",
                "recurrence": { "frequency": "weekly", "by_weekday": ["Mon"] }
            })),
            &source(),
        )
        .unwrap();

        // 07:00 BST
        assert_eq!(item.start, Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0).unwrap());
        assert_eq!(item.timezone, chrono_tz::Europe::London);
        assert_eq!(item.recurrence.unwrap().interval, 1);
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let err = normalize(
            &payload(serde_json::json!({
                "provider": "local",
                "id": "bad",
                "title": "Bad",
                "start": "2024-06-03T07:00",
                "recurrence": { "frequency": "daily", "interval": 0 }
            })),
            &source(),
        )
        .unwrap_err();

        assert!(matches!(err, NormalizationError::InvalidRule(_)));
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let err = normalize(
            &payload(serde_json::json!({
                "provider": "local",
                "id": "backwards",
                "title": "Backwards",
                "start": "2024-06-03T09:00",
                "end": "2024-06-03T08:00"
            })),
            &source(),
        )
        .unwrap_err();

        assert_eq!(err, NormalizationError::EndBeforeStart);
    }

    #[test]
    fn test_task_kind() {
        let item = normalize(
            &payload(serde_json::json!({
                "provider": "local",
                "id": "todo",
                "kind": "task",
                "title": "Call plumber",
                "start": "2024-06-03T12:00:00Z"
            })),
            &source(),
        )
        .unwrap();

        assert_eq!(item.kind, ItemKind::Task);
        assert_eq!(item.end, None);
    }
}
