use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Normalize, SourceContext, date_to_utc, non_empty, parse_instant, resolve_timezone,
    rrule_text, unknown_modification,
};
use crate::error::NormalizationError;
use crate::item::{CanonicalItem, ItemKind};

/// Google Calendar event resource (the fields daybook reads).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: Option<GoogleDateTime>,
    #[serde(default)]
    pub end: Option<GoogleDateTime>,
    /// "confirmed", "tentative" or "cancelled"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// RRULE / EXDATE lines, e.g. `"RRULE:FREQ=WEEKLY;BYDAY=MO"`
    #[serde(default)]
    pub recurrence: Vec<String>,
    /// Set on instance edits of a recurring event
    #[serde(default)]
    pub recurring_event_id: Option<String>,
    #[serde(default)]
    pub original_start_time: Option<GoogleDateTime>,
}

/// `{ dateTime | date, timeZone }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleDateTime {
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl GoogleDateTime {
    pub(crate) fn to_instant(
        &self,
        field: &'static str,
        source: &SourceContext,
    ) -> Result<DateTime<Utc>, NormalizationError> {
        let tz = resolve_timezone(self.time_zone.as_deref(), source);

        if let Some(dt) = &self.date_time {
            parse_instant(field, dt, tz)
        } else if let Some(date) = self.date {
            date_to_utc(date, tz).ok_or(NormalizationError::InvalidDateTime {
                field,
                value: date.to_string(),
            })
        } else {
            Err(NormalizationError::MissingField(field))
        }
    }
}

impl Normalize for GoogleEvent {
    fn normalize(&self, source: &SourceContext) -> Result<CanonicalItem, NormalizationError> {
        let title = non_empty(&self.summary).ok_or(NormalizationError::MissingField("title"))?;

        let start_field = self
            .start
            .as_ref()
            .ok_or(NormalizationError::MissingField("start"))?;
        let start = start_field.to_instant("start", source)?;
        let end = self
            .end
            .as_ref()
            .map(|end| end.to_instant("end", source))
            .transpose()?;

        let timezone = resolve_timezone(start_field.time_zone.as_deref(), source);
        let recurrence = rrule_text::parse_recurrence(&self.recurrence, timezone)?;

        Ok(CanonicalItem {
            id: CanonicalItem::qualified_id(&source.source_id, &self.id),
            kind: ItemKind::Event,
            title,
            description: non_empty(&self.description),
            location: non_empty(&self.location),
            start,
            end,
            timezone,
            recurrence,
            source_id: source.source_id.clone(),
            source_priority: source.source_priority,
            last_modified: self.updated.unwrap_or_else(unknown_modification),
        })
    }

    fn native_id(&self) -> &str {
        &self.id
    }

    fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Weekday};

    fn source() -> SourceContext {
        SourceContext::new("personal", 2, chrono_tz::Europe::Berlin)
    }

    fn event(json: serde_json::Value) -> GoogleEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_timed_event() {
        let item = event(serde_json::json!({
            "id": "abc",
            "summary": "Dentist",
            "location": "  ",
            "start": { "dateTime": "2024-02-01T10:00:00+01:00", "timeZone": "Europe/Berlin" },
            "end": { "dateTime": "2024-02-01T11:00:00+01:00", "timeZone": "Europe/Berlin" },
            "updated": "2024-01-20T08:00:00Z"
        }))
        .normalize(&source())
        .unwrap();

        assert_eq!(item.id, "personal:abc");
        assert_eq!(item.kind, ItemKind::Event);
        assert_eq!(item.start, Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap());
        assert_eq!(item.end, Some(Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()));
        assert_eq!(item.location, None);
        assert_eq!(item.source_priority, 2);
        assert_eq!(item.last_modified, Utc.with_ymd_and_hms(2024, 1, 20, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_all_day_event_starts_at_local_midnight() {
        let item = event(serde_json::json!({
            "id": "holiday",
            "summary": "Holiday",
            "start": { "date": "2024-07-01" },
            "end": { "date": "2024-07-02" }
        }))
        .normalize(&source())
        .unwrap();

        // Midnight in Berlin (CEST) is 22:00 UTC the day before
        assert_eq!(item.start.hour(), 22);
        assert_eq!(item.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_missing_start_is_an_error() {
        let err = event(serde_json::json!({ "id": "x", "summary": "No time" }))
            .normalize(&source())
            .unwrap_err();
        assert_eq!(err, NormalizationError::MissingField("start"));
    }

    #[test]
    fn test_recurrence_lines() {
        let item = event(serde_json::json!({
            "id": "weekly",
            "summary": "Gym",
            "start": { "dateTime": "2024-01-01T18:00:00", "timeZone": "Europe/Berlin" },
            "end": { "dateTime": "2024-01-01T19:00:00", "timeZone": "Europe/Berlin" },
            "recurrence": [
                "RRULE:FREQ=WEEKLY;BYDAY=MO,TH;COUNT=10",
                "EXDATE;TZID=Europe/Berlin:20240104T180000"
            ]
        }))
        .normalize(&source())
        .unwrap();

        let rule = item.recurrence.unwrap();
        assert_eq!(rule.by_weekday, vec![Weekday::Mon, Weekday::Thu]);
        assert_eq!(rule.count, Some(10));
        assert!(rule.exceptions.contains(&Utc.with_ymd_and_hms(2024, 1, 4, 17, 0, 0).unwrap()));
    }
}
