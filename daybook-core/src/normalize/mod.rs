//! Provider payloads and their conversion into canonical items.
//!
//! Each provider shape is one variant of [`ProviderPayload`] and implements
//! [`Normalize`]. Times without a usable timezone are read in the source's
//! declared zone, never the process-local one.

mod google;
mod local;
mod outlook;
pub mod rrule_text;
mod task;

use std::fmt;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, NormalizationError};
use crate::item::CanonicalItem;

pub use google::{GoogleDateTime, GoogleEvent};
pub use local::LocalItem;
pub use outlook::{OutlookDateTime, OutlookEvent, OutlookLocation, OutlookPattern, OutlookRange, OutlookRecurrence};
pub use task::GoogleTask;

/// Where a payload came from and how it ranks against other sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    pub source_id: String,
    /// Lower number = higher precedence
    pub source_priority: i32,
    /// Declared zone for payloads that carry none
    pub timezone: Tz,
}

impl SourceContext {
    pub fn new(source_id: &str, source_priority: i32, timezone: Tz) -> Self {
        SourceContext {
            source_id: source_id.to_string(),
            source_priority,
            timezone,
        }
    }
}

/// Capability shared by all provider payload shapes.
pub trait Normalize {
    fn normalize(&self, source: &SourceContext) -> Result<CanonicalItem, NormalizationError>;

    /// The provider's own id, for error reports.
    fn native_id(&self) -> &str;

    /// Deleted/cancelled upstream; such payloads produce no item.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Closed set of inbound payload shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderPayload {
    Google(GoogleEvent),
    Outlook(OutlookEvent),
    GoogleTask(GoogleTask),
    Local(LocalItem),
}

impl ProviderPayload {
    fn as_normalize(&self) -> &dyn Normalize {
        match self {
            ProviderPayload::Google(p) => p,
            ProviderPayload::Outlook(p) => p,
            ProviderPayload::GoogleTask(p) => p,
            ProviderPayload::Local(p) => p,
        }
    }

    pub fn native_id(&self) -> &str {
        self.as_normalize().native_id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.as_normalize().is_cancelled()
    }
}

/// Provider names as they appear in config files and payload tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    Outlook,
    GoogleTask,
    Local,
}

impl ProviderKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Outlook => "outlook",
            ProviderKind::GoogleTask => "google_task",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Payloads decoded from a provider export.
#[derive(Debug, Clone, Default)]
pub struct DecodedPayloads {
    pub payloads: Vec<ProviderPayload>,
    /// Array elements that do not fit the provider shape
    pub failures: Vec<PayloadFailure>,
}

/// Decode a JSON array (or a single object) of provider payloads.
///
/// Elements without a `provider` tag are read as `kind`. Elements that do not
/// decode are reported one by one; only a document that is not JSON at all
/// fails the whole call.
pub fn decode_payloads(kind: ProviderKind, json: &str) -> CoreResult<DecodedPayloads> {
    let document: serde_json::Value =
        serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))?;

    let elements = match document {
        serde_json::Value::Array(elements) => elements,
        other => vec![other],
    };

    let mut decoded = DecodedPayloads::default();
    for (index, mut element) in elements.into_iter().enumerate() {
        let native_id = element
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if let Some(object) = element.as_object_mut() {
            object
                .entry("provider")
                .or_insert_with(|| kind.tag().into());
        }

        match serde_json::from_value::<ProviderPayload>(element) {
            Ok(payload) => decoded.payloads.push(payload),
            Err(e) => {
                log::warn!("Skipping malformed {} payload #{}: {}", kind, index, e);
                decoded.failures.push(PayloadFailure {
                    index,
                    native_id,
                    error: NormalizationError::Malformed(e.to_string()),
                });
            }
        }
    }

    Ok(decoded)
}

/// Convert one payload into a validated canonical item.
pub fn normalize(
    payload: &ProviderPayload,
    source: &SourceContext,
) -> Result<CanonicalItem, NormalizationError> {
    let item = payload.as_normalize().normalize(source)?;
    check(&item)?;
    Ok(item)
}

fn check(item: &CanonicalItem) -> Result<(), NormalizationError> {
    item.validate().map_err(|e| match e {
        CoreError::InvalidItem { .. } => NormalizationError::EndBeforeStart,
        other => NormalizationError::InvalidRule(other.to_string()),
    })
}

/// A payload that could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFailure {
    /// Position in the input batch
    pub index: usize,
    pub native_id: String,
    pub error: NormalizationError,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub items: Vec<CanonicalItem>,
    pub failures: Vec<PayloadFailure>,
    /// Ids of items cancelled or deleted upstream
    pub cancelled: Vec<String>,
}

/// Normalize a provider batch, isolating per-payload failures.
///
/// Google instance edits (`recurringEventId` + `originalStartTime`) are folded
/// into their master's overrides; cancelled instances become exceptions.
pub fn normalize_batch(payloads: &[ProviderPayload], source: &SourceContext) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut instances = Vec::new();

    for (index, payload) in payloads.iter().enumerate() {
        if let ProviderPayload::Google(event) = payload {
            if event.recurring_event_id.is_some() {
                instances.push((index, event));
                continue;
            }
        }

        if payload.is_cancelled() {
            log::debug!("Skipping cancelled payload '{}'", payload.native_id());
            batch
                .cancelled
                .push(CanonicalItem::qualified_id(&source.source_id, payload.native_id()));
            continue;
        }

        match normalize(payload, source) {
            Ok(item) => batch.items.push(item),
            Err(error) => {
                log::warn!(
                    "Skipping payload '{}' from '{}': {}",
                    payload.native_id(),
                    source.source_id,
                    error
                );
                batch.failures.push(PayloadFailure {
                    index,
                    native_id: payload.native_id().to_string(),
                    error,
                });
            }
        }
    }

    for (index, event) in instances {
        if let Err(error) = fold_instance(&mut batch.items, event, source) {
            log::warn!("Skipping instance edit '{}': {}", event.id, error);
            batch.failures.push(PayloadFailure {
                index,
                native_id: event.id.clone(),
                error,
            });
        }
    }

    batch
}

fn fold_instance(
    items: &mut [CanonicalItem],
    event: &GoogleEvent,
    source: &SourceContext,
) -> Result<(), NormalizationError> {
    let master_native = event
        .recurring_event_id
        .as_deref()
        .ok_or(NormalizationError::MissingField("recurringEventId"))?;
    let master_id = CanonicalItem::qualified_id(&source.source_id, master_native);

    let original = event
        .original_start_time
        .as_ref()
        .ok_or(NormalizationError::MissingField("originalStartTime"))?
        .to_instant("originalStartTime", source)?;

    let master = items
        .iter_mut()
        .find(|item| item.id == master_id)
        .ok_or_else(|| NormalizationError::OrphanInstance(master_native.to_string()))?;
    let rule = master
        .recurrence
        .as_mut()
        .ok_or_else(|| NormalizationError::OrphanInstance(master_native.to_string()))?;

    if event.is_cancelled() {
        rule.overrides.remove(&original);
        rule.exceptions.insert(original);
        return Ok(());
    }

    let mut edit = event.normalize(source)?;
    edit.recurrence = None;
    check(&edit)?;

    // Apply to a copy so a rejected edit leaves the master untouched
    let mut updated = rule.clone();
    updated.exceptions.remove(&original);
    updated.overrides.insert(original, edit);
    let previous = std::mem::replace(rule, updated);
    if let Err(error) = check(master) {
        master.recurrence = Some(previous);
        return Err(error);
    }
    Ok(())
}

/// Pick the payload's zone, falling back to the source's declared zone.
pub(crate) fn resolve_timezone(name: Option<&str>, source: &SourceContext) -> Tz {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            log::warn!(
                "Unknown timezone '{}', using '{}' of source '{}'",
                name,
                source.timezone.name(),
                source.source_id
            );
            source.timezone
        }),
        None => source.timezone,
    }
}

/// Interpret a wall-clock time in `tz`. Times inside a DST gap move forward an hour.
pub(crate) fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Local midnight of `date` in `tz`.
pub(crate) fn date_to_utc(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    local_to_utc(date.and_time(NaiveTime::MIN), tz)
}

/// Parse an RFC 3339 timestamp, or a naive date-time read in `tz`.
pub(crate) fn parse_instant(
    field: &'static str,
    value: &str,
    tz: Tz,
) -> Result<DateTime<Utc>, NormalizationError> {
    let invalid = || NormalizationError::InvalidDateTime {
        field,
        value: value.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| invalid())?;
    local_to_utc(naive, tz).ok_or_else(invalid)
}

/// Non-empty trimmed text, or None.
pub(crate) fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Modification time for payloads that do not report one.
pub(crate) fn unknown_modification() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn source() -> SourceContext {
        SourceContext::new("work", 1, chrono_tz::America::New_York)
    }

    fn google(json: serde_json::Value) -> ProviderPayload {
        let mut json = json;
        json["provider"] = "google".into();
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_decode_payloads_fills_in_provider_tag() {
        let json = r#"[
            { "id": "a", "title": "Buy milk", "due": "2024-01-15T00:00:00.000Z" },
            { "provider": "local", "id": "b", "title": "Local", "start": "2024-01-15T09:00" },
            { "id": 42 }
        ]"#;

        let decoded = decode_payloads(ProviderKind::GoogleTask, json).unwrap();
        assert_eq!(decoded.payloads.len(), 2);
        assert!(matches!(decoded.payloads[0], ProviderPayload::GoogleTask(_)));
        assert!(matches!(decoded.payloads[1], ProviderPayload::Local(_)));
        assert_eq!(decoded.failures.len(), 1);
        assert_eq!(decoded.failures[0].index, 2);
        assert!(matches!(decoded.failures[0].error, NormalizationError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode_payloads(ProviderKind::Google, "not json").is_err());
    }

    #[test]
    fn test_naive_time_uses_source_timezone() {
        let dt = parse_instant("start", "2024-01-15T09:00:00", source().timezone).unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_offset_time_is_exact() {
        let dt = parse_instant("start", "2024-01-15T09:00:00+01:00", source().timezone).unwrap();
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_source() {
        assert_eq!(resolve_timezone(Some("Mars/Olympus"), &source()), source().timezone);
        assert_eq!(resolve_timezone(None, &source()), source().timezone);
        assert_eq!(resolve_timezone(Some("Europe/Paris"), &source()), chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // 02:30 does not exist in New York on 2024-03-10
        let naive = NaiveDateTime::parse_from_str("2024-03-10T02:30:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let dt = local_to_utc(naive, chrono_tz::America::New_York).unwrap();
        assert_eq!(dt.hour(), 7);
    }

    #[test]
    fn test_batch_isolates_failures() {
        let payloads = vec![
            google(serde_json::json!({
                "id": "ok",
                "summary": "Standup",
                "start": { "dateTime": "2024-01-15T09:00:00Z" },
                "end": { "dateTime": "2024-01-15T09:15:00Z" }
            })),
            google(serde_json::json!({
                "id": "untitled",
                "start": { "dateTime": "2024-01-15T10:00:00Z" }
            })),
        ];

        let batch = normalize_batch(&payloads, &source());
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].id, "work:ok");
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 1);
        assert_eq!(batch.failures[0].error, NormalizationError::MissingField("title"));
    }

    #[test]
    fn test_batch_folds_instance_edits_into_master() {
        let payloads = vec![
            google(serde_json::json!({
                "id": "weekly",
                "summary": "Sync",
                "start": { "dateTime": "2024-01-01T15:00:00Z" },
                "end": { "dateTime": "2024-01-01T16:00:00Z" },
                "recurrence": ["RRULE:FREQ=WEEKLY"]
            })),
            google(serde_json::json!({
                "id": "weekly_20240108T150000Z",
                "summary": "Sync (moved)",
                "recurringEventId": "weekly",
                "originalStartTime": { "dateTime": "2024-01-08T15:00:00Z" },
                "start": { "dateTime": "2024-01-09T15:00:00Z" },
                "end": { "dateTime": "2024-01-09T16:00:00Z" }
            })),
            google(serde_json::json!({
                "id": "weekly_20240115T150000Z",
                "status": "cancelled",
                "recurringEventId": "weekly",
                "originalStartTime": { "dateTime": "2024-01-15T15:00:00Z" }
            })),
        ];

        let batch = normalize_batch(&payloads, &source());
        assert!(batch.failures.is_empty(), "{:?}", batch.failures);
        assert_eq!(batch.items.len(), 1);

        let rule = batch.items[0].recurrence.as_ref().unwrap();
        assert_eq!(rule.overrides.len(), 1);
        assert_eq!(rule.exceptions.len(), 1);
        let moved = rule.overrides.values().next().unwrap();
        assert_eq!(moved.title, "Sync (moved)");
    }

    #[test]
    fn test_bad_instance_edit_leaves_master_intact() {
        let payloads = vec![
            google(serde_json::json!({
                "id": "weekly",
                "summary": "Sync",
                "start": { "dateTime": "2024-01-01T15:00:00Z" },
                "end": { "dateTime": "2024-01-01T16:00:00Z" },
                "recurrence": ["RRULE:FREQ=WEEKLY"]
            })),
            google(serde_json::json!({
                "id": "weekly_20240108T150000Z",
                "summary": "Sync (backwards)",
                "recurringEventId": "weekly",
                "originalStartTime": { "dateTime": "2024-01-08T15:00:00Z" },
                "start": { "dateTime": "2024-01-08T15:00:00Z" },
                "end": { "dateTime": "2024-01-08T14:00:00Z" }
            })),
            google(serde_json::json!({
                "id": "lunch",
                "summary": "Lunch",
                "start": { "dateTime": "2024-01-08T12:00:00Z" },
                "end": { "dateTime": "2024-01-08T13:00:00Z" }
            })),
        ];

        let batch = normalize_batch(&payloads, &source());
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 1);
        assert_eq!(batch.failures[0].error, NormalizationError::EndBeforeStart);

        let master = batch.items.iter().find(|i| i.id == "work:weekly").unwrap();
        assert!(master.recurrence.as_ref().unwrap().overrides.is_empty());
        assert!(master.validate().is_ok());
    }

    #[test]
    fn test_batch_reports_orphan_instances() {
        let payloads = vec![google(serde_json::json!({
            "id": "lost_1",
            "summary": "Lost",
            "recurringEventId": "missing",
            "originalStartTime": { "dateTime": "2024-01-08T15:00:00Z" },
            "start": { "dateTime": "2024-01-09T15:00:00Z" }
        }))];

        let batch = normalize_batch(&payloads, &source());
        assert!(batch.items.is_empty());
        assert_eq!(
            batch.failures[0].error,
            NormalizationError::OrphanInstance("missing".to_string())
        );
    }

    #[test]
    fn test_cancelled_payloads_are_skipped() {
        let payloads = vec![google(serde_json::json!({
            "id": "gone",
            "status": "cancelled"
        }))];

        let batch = normalize_batch(&payloads, &source());
        assert!(batch.items.is_empty());
        assert!(batch.failures.is_empty());
        assert_eq!(batch.cancelled, vec!["work:gone".to_string()]);
    }
}
