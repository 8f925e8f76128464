use daybook_core::{CoreResult, Notification, NotificationSink};
use owo_colors::OwoColorize;

/// Prints fired reminders to stdout.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn deliver(&self, notification: &Notification) -> CoreResult<()> {
        let starts = notification
            .occurrence_start
            .with_timezone(&chrono::Local)
            .format("%H:%M");

        println!(
            "{} {} {}",
            "⏰".yellow(),
            notification.title.bold(),
            format!("starts at {}", starts).dimmed()
        );
        Ok(())
    }
}
