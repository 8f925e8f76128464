use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{
    Normalize, SourceContext, date_to_utc, non_empty, parse_instant, resolve_timezone,
    unknown_modification,
};
use crate::error::NormalizationError;
use crate::item::{CanonicalItem, ItemKind};
use crate::recurrence::{Frequency, RecurrenceRule};

/// Microsoft Graph event resource (the fields daybook reads).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookEvent {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_preview: Option<String>,
    #[serde(default)]
    pub location: Option<OutlookLocation>,
    #[serde(default)]
    pub start: Option<OutlookDateTime>,
    #[serde(default)]
    pub end: Option<OutlookDateTime>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<OutlookRecurrence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookLocation {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Graph sends a naive wall-clock time plus a zone name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookDateTime {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookRecurrence {
    pub pattern: OutlookPattern,
    pub range: OutlookRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookPattern {
    /// "daily", "weekly", "absoluteMonthly", "absoluteYearly", ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<String>,
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookRange {
    /// "endDate", "noEnd" or "numbered"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub number_of_occurrences: Option<u32>,
}

impl OutlookDateTime {
    fn to_instant(
        &self,
        field: &'static str,
        all_day: bool,
        source: &SourceContext,
    ) -> Result<DateTime<Utc>, NormalizationError> {
        let tz = resolve_timezone(self.time_zone.as_deref(), source);

        if all_day {
            let date = self
                .date_time
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            if let Some(instant) = date.and_then(|d| date_to_utc(d, tz)) {
                return Ok(instant);
            }
        }

        parse_instant(field, &self.date_time, tz)
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

impl OutlookRecurrence {
    fn to_rule(&self, tz: Tz) -> Result<RecurrenceRule, NormalizationError> {
        let unsupported =
            |what: &str| NormalizationError::UnsupportedRecurrence(format!("{} '{}'", what, self.pattern.kind));

        let frequency = match self.pattern.kind.as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "absoluteMonthly" => Frequency::Monthly,
            "absoluteYearly" => Frequency::Yearly,
            _ => return Err(unsupported("pattern")),
        };

        let mut rule = RecurrenceRule::new(frequency).every(self.pattern.interval);

        if frequency == Frequency::Weekly {
            rule.by_weekday = self
                .pattern
                .days_of_week
                .iter()
                .map(|d| weekday_from_name(d).ok_or_else(|| unsupported("weekday in")))
                .collect::<Result<_, _>>()?;
        }

        match self.range.kind.as_str() {
            "noEnd" => {}
            "numbered" => {
                rule.count = Some(
                    self.range
                        .number_of_occurrences
                        .ok_or(NormalizationError::MissingField("numberOfOccurrences"))?,
                );
            }
            "endDate" => {
                let end_date = self
                    .range
                    .end_date
                    .ok_or(NormalizationError::MissingField("endDate"))?;
                let next_midnight =
                    date_to_utc(end_date + Duration::days(1), tz).ok_or_else(|| {
                        NormalizationError::InvalidDateTime {
                            field: "endDate",
                            value: end_date.to_string(),
                        }
                    })?;
                rule.until = Some(next_midnight - Duration::seconds(1));
            }
            other => {
                return Err(NormalizationError::UnsupportedRecurrence(format!(
                    "range '{}'",
                    other
                )));
            }
        }

        Ok(rule)
    }
}

impl Normalize for OutlookEvent {
    fn normalize(&self, source: &SourceContext) -> Result<CanonicalItem, NormalizationError> {
        let title = non_empty(&self.subject).ok_or(NormalizationError::MissingField("title"))?;

        let start_field = self
            .start
            .as_ref()
            .ok_or(NormalizationError::MissingField("start"))?;
        let start = start_field.to_instant("start", self.is_all_day, source)?;
        let end = self
            .end
            .as_ref()
            .map(|end| end.to_instant("end", self.is_all_day, source))
            .transpose()?;

        let timezone = resolve_timezone(start_field.time_zone.as_deref(), source);
        let recurrence = self
            .recurrence
            .as_ref()
            .map(|r| r.to_rule(timezone))
            .transpose()?;

        Ok(CanonicalItem {
            id: CanonicalItem::qualified_id(&source.source_id, &self.id),
            kind: ItemKind::Event,
            title,
            description: non_empty(&self.body_preview),
            location: self
                .location
                .as_ref()
                .and_then(|l| non_empty(&l.display_name)),
            start,
            end,
            timezone,
            recurrence,
            source_id: source.source_id.clone(),
            source_priority: source.source_priority,
            last_modified: self
                .last_modified_date_time
                .unwrap_or_else(unknown_modification),
        })
    }

    fn native_id(&self) -> &str {
        &self.id
    }

    fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> SourceContext {
        SourceContext::new("office", 1, chrono_tz::America::Los_Angeles)
    }

    fn event(json: serde_json::Value) -> OutlookEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_windows_zone_name_falls_back_to_source() {
        let item = event(serde_json::json!({
            "id": "AAMk1",
            "subject": "Planning",
            "start": { "dateTime": "2024-01-10T10:00:00.0000000", "timeZone": "Pacific Standard Time" },
            "end": { "dateTime": "2024-01-10T11:00:00.0000000", "timeZone": "Pacific Standard Time" },
            "location": { "displayName": "Room 4" }
        }))
        .normalize(&source())
        .unwrap();

        assert_eq!(item.start, Utc.with_ymd_and_hms(2024, 1, 10, 18, 0, 0).unwrap());
        assert_eq!(item.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(item.location.as_deref(), Some("Room 4"));
    }

    #[test]
    fn test_utc_zone() {
        let item = event(serde_json::json!({
            "id": "AAMk2",
            "subject": "Call",
            "start": { "dateTime": "2024-01-10T10:00:00.0000000", "timeZone": "UTC" }
        }))
        .normalize(&source())
        .unwrap();

        assert_eq!(item.start, Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap());
        assert_eq!(item.end, None);
    }

    #[test]
    fn test_weekly_numbered_recurrence() {
        let item = event(serde_json::json!({
            "id": "AAMk3",
            "subject": "1:1",
            "start": { "dateTime": "2024-01-08T09:00:00.0000000", "timeZone": "UTC" },
            "end": { "dateTime": "2024-01-08T09:30:00.0000000", "timeZone": "UTC" },
            "recurrence": {
                "pattern": { "type": "weekly", "interval": 1, "daysOfWeek": ["monday", "Wednesday"] },
                "range": { "type": "numbered", "numberOfOccurrences": 6 }
            }
        }))
        .normalize(&source())
        .unwrap();

        let rule = item.recurrence.unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.by_weekday, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(rule.count, Some(6));
    }

    #[test]
    fn test_relative_monthly_is_unsupported() {
        let err = event(serde_json::json!({
            "id": "AAMk4",
            "subject": "Board",
            "start": { "dateTime": "2024-01-08T09:00:00", "timeZone": "UTC" },
            "recurrence": {
                "pattern": { "type": "relativeMonthly", "interval": 1, "daysOfWeek": ["monday"] },
                "range": { "type": "noEnd" }
            }
        }))
        .normalize(&source())
        .unwrap_err();

        assert!(matches!(err, NormalizationError::UnsupportedRecurrence(_)));
    }

    #[test]
    fn test_end_date_range_is_inclusive() {
        let item = event(serde_json::json!({
            "id": "AAMk5",
            "subject": "Daily",
            "start": { "dateTime": "2024-01-08T09:00:00", "timeZone": "UTC" },
            "recurrence": {
                "pattern": { "type": "daily", "interval": 1 },
                "range": { "type": "endDate", "endDate": "2024-01-12" }
            }
        }))
        .normalize(&source())
        .unwrap();

        assert_eq!(
            item.recurrence.unwrap().until,
            Some(Utc.with_ymd_and_hms(2024, 1, 12, 23, 59, 59).unwrap())
        );
    }
}
