//! Recurrence rules and their expansion into occurrences.
//!
//! Base instants come from the rrule crate, evaluated in the item's own
//! timezone so wall-clock times survive DST changes. Exceptions and overrides
//! are keyed by the instant the rule generates and applied on top.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::item::CanonicalItem;
use crate::occurrence::Occurrence;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// How an item repeats, plus per-instance edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekly rules only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub by_weekday: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Generated instants to skip
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exceptions: BTreeSet<DateTime<Utc>>,
    /// Single-instance edits, keyed by the unmodified generated instant
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<DateTime<Utc>, CanonicalItem>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        RecurrenceRule {
            frequency,
            interval: 1,
            by_weekday: Vec::new(),
            count: None,
            until: None,
            exceptions: BTreeSet::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn on(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.by_weekday = weekdays.into_iter().collect();
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn except(mut self, instant: DateTime<Utc>) -> Self {
        self.exceptions.insert(instant);
        self
    }

    pub fn with_override(mut self, original: DateTime<Utc>, edit: CanonicalItem) -> Self {
        self.overrides.insert(original, edit);
        self
    }

    /// Reject malformed rules. Called when items are written and before expansion.
    pub fn validate(&self) -> CoreResult<()> {
        if self.interval < 1 {
            return Err(CoreError::InvalidRule("interval must be at least 1".into()));
        }
        if self.count.is_some() && self.until.is_some() {
            return Err(CoreError::InvalidRule(
                "count and until cannot both be set".into(),
            ));
        }
        if self.count == Some(0) {
            return Err(CoreError::InvalidRule("count must be positive".into()));
        }
        if !self.by_weekday.is_empty() && self.frequency != Frequency::Weekly {
            return Err(CoreError::InvalidRule(format!(
                "weekdays are only allowed on weekly rules, not {:?}",
                self.frequency
            )));
        }
        Ok(())
    }
}

/// Upper bound on the instants produced by a single expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub max_instances: u16,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        ExpansionLimits {
            max_instances: 2000,
        }
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Build an iCalendar-format DTSTART/RRULE string for the rrule crate parser.
///
/// UNTIL, EXDATE and overrides are applied by the caller, not the rrule crate.
fn build_rrule_string(item: &CanonicalItem, rule: &RecurrenceRule) -> String {
    let mut lines = Vec::new();

    let dtstart = if item.timezone == Tz::UTC {
        format!("DTSTART:{}", item.start.format("%Y%m%dT%H%M%SZ"))
    } else {
        format!(
            "DTSTART;TZID={}:{}",
            item.timezone.name(),
            item.start.with_timezone(&item.timezone).format("%Y%m%dT%H%M%S")
        )
    };
    lines.push(dtstart);

    let mut parts = vec![
        format!("FREQ={}", rule.frequency.as_rrule()),
        format!("INTERVAL={}", rule.interval),
    ];
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={}", count));
    }
    if !rule.by_weekday.is_empty() {
        let mut days = rule.by_weekday.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        let codes: Vec<&str> = days.into_iter().map(weekday_code).collect();
        parts.push(format!("BYDAY={}", codes.join(",")));
    }
    lines.push(format!("RRULE:{}", parts.join(";")));

    lines.join("\n")
}

/// Rule-generated instants in `[from, to)`, ascending, honoring `until`.
fn base_instants(
    item: &CanonicalItem,
    rule: &RecurrenceRule,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limits: ExpansionLimits,
) -> CoreResult<Vec<DateTime<Utc>>> {
    let to = match rule.until {
        Some(until) => to.min(until + Duration::seconds(1)),
        None => to,
    };
    if to <= from {
        return Ok(Vec::new());
    }

    let rrule_str = build_rrule_string(item, rule);
    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
        CoreError::InvalidRule(format!("Failed to parse RRULE for '{}': {}", item.id, e))
    })?;

    // Pad by one second so the bounds are inclusive; the exact half-open
    // filter happens below.
    let tz: rrule::Tz = Utc.into();
    let after = (from - Duration::seconds(1)).with_timezone(&tz);
    let before = (to + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(limits.max_instances);
    if result.limited {
        log::warn!(
            "Expansion of '{}' truncated at {} instances",
            item.id,
            limits.max_instances
        );
    }

    Ok(result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| from <= *dt && *dt < to)
        .collect())
}

/// Whether the rule generates exactly `instant`.
fn generates(item: &CanonicalItem, rule: &RecurrenceRule, instant: DateTime<Utc>) -> CoreResult<bool> {
    let found = base_instants(
        item,
        rule,
        instant,
        instant + Duration::seconds(1),
        ExpansionLimits { max_instances: 2 },
    )?;
    Ok(found.first() == Some(&instant))
}

/// Expand an item into its occurrences within `window`.
///
/// Non-recurring items yield one occurrence if their start lies in the window.
/// For recurring items, window membership is decided on the effective start, so
/// an override moved into the window from outside it is included and one moved
/// out is not. Occurrences come out in original-instant order.
pub fn expand(item: &CanonicalItem, window: &Window) -> CoreResult<Occurrences> {
    expand_with_limits(item, window, ExpansionLimits::default())
}

pub fn expand_with_limits(
    item: &CanonicalItem,
    window: &Window,
    limits: ExpansionLimits,
) -> CoreResult<Occurrences> {
    let mut base = item.clone();
    let Some(rule) = base.recurrence.take() else {
        let instants = if window.contains(item.start) {
            vec![item.start]
        } else {
            Vec::new()
        };
        return Ok(Occurrences::new(base, None, *window, instants));
    };

    rule.validate()?;

    let mut instants = base_instants(item, &rule, window.from, window.to, limits)?;

    // Overrides whose original instant lies outside the window but whose
    // edited start was moved into it.
    for (original, edit) in &rule.overrides {
        if window.contains(*original) || !window.contains(edit.start) {
            continue;
        }
        if generates(item, &rule, *original)? {
            instants.push(*original);
        }
    }
    instants.sort();
    instants.dedup();

    Ok(Occurrences::new(base, Some(rule), *window, instants))
}

/// Lazily materialized occurrences of one item. Finite; re-run [`expand`] to restart.
#[derive(Debug, Clone)]
pub struct Occurrences {
    base: CanonicalItem,
    rule: Option<RecurrenceRule>,
    window: Window,
    instants: std::vec::IntoIter<DateTime<Utc>>,
}

impl Occurrences {
    fn new(
        base: CanonicalItem,
        rule: Option<RecurrenceRule>,
        window: Window,
        instants: Vec<DateTime<Utc>>,
    ) -> Self {
        Occurrences {
            base,
            rule,
            window,
            instants: instants.into_iter(),
        }
    }

    fn generated(&self, instant: DateTime<Utc>) -> Occurrence {
        let duration = self.base.duration();
        let mut data = self.base.clone();
        data.start = instant;
        data.end = self.base.end.map(|_| instant + duration);

        Occurrence {
            item_id: self.base.id.clone(),
            original_start: instant,
            occurrence_start: instant,
            occurrence_end: instant + duration,
            data,
        }
    }

    fn overridden(&self, instant: DateTime<Utc>, edit: &CanonicalItem) -> Occurrence {
        let end = edit
            .end
            .unwrap_or_else(|| edit.start + self.base.duration());

        let mut data = edit.clone();
        data.id = self.base.id.clone();
        data.recurrence = None;
        data.source_id = self.base.source_id.clone();
        data.source_priority = self.base.source_priority;

        Occurrence {
            item_id: self.base.id.clone(),
            original_start: instant,
            occurrence_start: edit.start,
            occurrence_end: end,
            data,
        }
    }
}

impl Iterator for Occurrences {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            let instant = self.instants.next()?;
            let Some(rule) = &self.rule else {
                return Some(self.generated(instant));
            };

            if rule.exceptions.contains(&instant) {
                continue;
            }

            match rule.overrides.get(&instant) {
                Some(edit) => {
                    if !self.window.contains(edit.start) {
                        continue;
                    }
                    return Some(self.overridden(instant, edit));
                }
                None => return Some(self.generated(instant)),
            }
        }
    }
}
