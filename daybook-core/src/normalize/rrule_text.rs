//! RRULE / EXDATE text lines as providers send them.
//!
//! Providers return entries like:
//! - `"RRULE:FREQ=WEEKLY;BYDAY=MO"`
//! - `"EXDATE;TZID=America/New_York:20240108T100000"`
//! - `"EXDATE:20240108T100000Z"`
//! - `"EXDATE;VALUE=DATE:20240108"`

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;

use super::{date_to_utc, local_to_utc};
use crate::error::NormalizationError;
use crate::recurrence::{Frequency, RecurrenceRule};

/// Parse provider recurrence lines. Returns `None` when there is no RRULE.
pub fn parse_recurrence(
    entries: &[String],
    tz: Tz,
) -> Result<Option<RecurrenceRule>, NormalizationError> {
    let Some(rrule) = entries.iter().find_map(|s| s.strip_prefix("RRULE:")) else {
        return Ok(None);
    };

    let mut rule = parse_rrule(rrule, tz)?;

    for entry in entries.iter().filter(|s| s.starts_with("EXDATE")) {
        rule.exceptions.extend(parse_exdate_line(entry, tz)?);
    }

    Ok(Some(rule))
}

/// Parse the value part of an RRULE line (`FREQ=...;INTERVAL=...`).
pub fn parse_rrule(value: &str, tz: Tz) -> Result<RecurrenceRule, NormalizationError> {
    let unsupported = |part: &str| NormalizationError::UnsupportedRecurrence(part.to_string());

    let mut frequency = None;
    let mut rule = RecurrenceRule::new(Frequency::Daily);

    for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = part.split_once('=').ok_or_else(|| unsupported(part))?;

        match key {
            "FREQ" => {
                frequency = Some(match val {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    _ => return Err(unsupported(part)),
                });
            }
            "INTERVAL" => {
                rule.interval = val
                    .parse()
                    .map_err(|_| NormalizationError::InvalidRule(format!("bad {}", part)))?;
            }
            "COUNT" => {
                rule.count = Some(
                    val.parse()
                        .map_err(|_| NormalizationError::InvalidRule(format!("bad {}", part)))?,
                );
            }
            "UNTIL" => rule.until = Some(parse_until(val, tz)?),
            "BYDAY" => {
                rule.by_weekday = val
                    .split(',')
                    .map(|code| weekday_from_code(code.trim()).ok_or_else(|| unsupported(part)))
                    .collect::<Result<_, _>>()?;
            }
            // Week start only matters for BYWEEKNO/BYSETPOS, which are not supported
            "WKST" => {}
            _ => return Err(unsupported(part)),
        }
    }

    rule.frequency = frequency.ok_or(NormalizationError::MissingField("FREQ"))?;
    Ok(rule)
}

fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        // Ordinal forms such as "1MO" or "-1FR"
        _ => None,
    }
}

/// UNTIL is inclusive; a bare date covers that whole local day.
fn parse_until(value: &str, tz: Tz) -> Result<DateTime<Utc>, NormalizationError> {
    let invalid = || NormalizationError::InvalidDateTime {
        field: "UNTIL",
        value: value.to_string(),
    };

    if value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| invalid())?;
        let next_midnight = date_to_utc(date + Duration::days(1), tz).ok_or_else(invalid)?;
        return Ok(next_midnight - Duration::seconds(1));
    }

    parse_ics_datetime(value, tz).ok_or_else(invalid)
}

/// `20240108T100000Z` (UTC) or `20240108T100000` (wall clock in `tz`).
fn parse_ics_datetime(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    match value.strip_suffix('Z') {
        Some(utc) => NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| dt.and_utc()),
        None => NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .ok()
            .and_then(|dt| local_to_utc(dt, tz)),
    }
}

/// Parse one EXDATE line, which may hold several comma-separated values.
fn parse_exdate_line(line: &str, default_tz: Tz) -> Result<Vec<DateTime<Utc>>, NormalizationError> {
    let invalid = || NormalizationError::InvalidDateTime {
        field: "EXDATE",
        value: line.to_string(),
    };

    let (params_part, values) = line.split_once(':').ok_or_else(invalid)?;
    let params = params_part.strip_prefix("EXDATE").unwrap_or("");
    let params = params.strip_prefix(';').unwrap_or(params);

    let tz = params
        .split(';')
        .find_map(|p| p.strip_prefix("TZID="))
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(default_tz);
    let is_date = params.split(';').any(|p| p == "VALUE=DATE");

    values
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let instant = if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .and_then(|d| date_to_utc(d, tz))
            } else {
                parse_ics_datetime(s, tz)
            };
            instant.ok_or_else(invalid)
        })
        .collect()
}
