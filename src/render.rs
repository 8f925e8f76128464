//! Terminal rendering for daybook types.

use chrono::{DateTime, Local, NaiveDate, Utc};
use daybook_core::{ConflictMarker, ItemKind, MergeDiagnostic, Occurrence, Reminder};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Occurrence {
    fn render(&self) -> String {
        let time = match self.kind() {
            ItemKind::Task => format!("{:>7}", "due"),
            ItemKind::Event => format_time(self.occurrence_start),
        };
        let source = format!("[{}]", self.source_id());

        let mut line = format!("{} {} {}", time, self.title(), source.dimmed());
        if self.is_moved() {
            line.push_str(&format!(" {}", "(moved)".yellow()));
        }
        line
    }
}

impl Render for ConflictMarker {
    fn render(&self) -> String {
        let span = format!(
            "{}-{}",
            self.overlap_start.with_timezone(&Local).format("%a %b %-d %H:%M"),
            self.overlap_end.with_timezone(&Local).format("%H:%M")
        );
        format!("{} {}", "!".red(), span.red())
    }
}

impl Render for MergeDiagnostic {
    fn render(&self) -> String {
        format!("skipped {}", self).dimmed().to_string()
    }
}

impl Render for Reminder {
    fn render(&self) -> String {
        let starts = self.occurrence_start.with_timezone(&Local).format("%H:%M");
        format!(
            "{} {} {}",
            "⏰".yellow(),
            self.title.bold(),
            format!("starts {} ({} before)", starts, self.offset).dimmed()
        )
    }
}

/// Human label for a day (e.g. "Today", "Tomorrow", "Wed Feb 25").
pub fn format_date_label(date: NaiveDate) -> String {
    let today = Local::now().date_naive();

    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

/// Local calendar day an instant falls on.
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

fn format_time(instant: DateTime<Utc>) -> String {
    format!("{:>7}", instant.with_timezone(&Local).format("%H:%M"))
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
