use anyhow::{Context, Result};
use chrono::Utc;
use daybook_core::{Dashboard, ReminderOffset};
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(dashboard: &Dashboard, item_id: &str, offsets: &[String]) -> Result<()> {
    let offsets = offsets
        .iter()
        .map(|s| s.parse::<ReminderOffset>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid reminder offset")?;

    let item = dashboard
        .items()
        .item(item_id)?
        .with_context(|| format!("No item with id '{}'", item_id))?;

    dashboard.set_reminder_offsets(item_id, offsets.clone())?;

    if offsets.is_empty() {
        println!("{} Reminders cleared for {}", "✓".green(), item.title.bold());
        return Ok(());
    }

    let labels: Vec<String> = offsets.iter().map(|o| o.to_string()).collect();
    println!(
        "{} {} will remind {} before",
        "✓".green(),
        item.title.bold(),
        labels.join(", ")
    );

    let (_, planned) = dashboard.planned_reminders(Utc::now())?;
    for reminder in planned.iter().filter(|r| r.item_id == item_id) {
        println!("  {}", reminder.render());
    }

    Ok(())
}
