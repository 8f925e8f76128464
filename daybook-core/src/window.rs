//! Query window for expansion, merging and reminder horizons.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Number of days shown ahead of now when no `--to` is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Half-open interval `[from, to)` of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Self> {
        if to <= from {
            return Err(CoreError::InvalidWindow(format!(
                "window end {} is not after its start {}",
                to, from
            )));
        }
        Ok(Window { from, to })
    }

    /// Window of `length` starting at `from`.
    pub fn starting_at(from: DateTime<Utc>, length: Duration) -> CoreResult<Self> {
        Self::new(from, from + length)
    }

    /// Parse CLI arguments into a window.
    /// - `from`: YYYY-MM-DD or "today", defaults to start of today
    /// - `to`: YYYY-MM-DD (inclusive day), defaults to +DEFAULT_WINDOW_DAYS
    pub fn from_args(from: Option<&str>, to: Option<&str>, now: DateTime<Utc>) -> CoreResult<Self> {
        let today = start_of_day(now.date_naive());

        let from_dt = match from {
            None | Some("today") => today,
            Some(s) => start_of_day(parse_date(s)?),
        };

        let to_dt = match to {
            Some(s) => start_of_day(parse_date(s)?) + Duration::days(1),
            None => from_dt + Duration::days(DEFAULT_WINDOW_DAYS),
        };

        Self::new(from_dt, to_dt)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }

    /// Whether `[start, end)` intersects this window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.to && end > self.from
    }

    pub fn length(&self) -> Duration {
        self.to - self.from
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn parse_date(s: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        CoreError::InvalidWindow(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rejects_empty_window() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Window::new(t, t).is_err());
        assert!(Window::new(t, t - Duration::hours(1)).is_err());
    }

    #[test]
    fn test_contains_is_half_open() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let window = Window::new(from, to).unwrap();

        assert!(window.contains(from));
        assert!(!window.contains(to));
    }

    #[test]
    fn test_from_args_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let window = Window::from_args(None, None, now).unwrap();

        assert_eq!(window.from, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(window.length(), Duration::days(DEFAULT_WINDOW_DAYS));
    }

    #[test]
    fn test_from_args_to_is_inclusive_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let window = Window::from_args(Some("2024-03-01"), Some("2024-03-31"), now).unwrap();

        assert_eq!(window.to, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_from_args_bad_date() {
        let now = Utc::now();
        assert!(Window::from_args(Some("03/01/2024"), None, now).is_err());
    }
}
