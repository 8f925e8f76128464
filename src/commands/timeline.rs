use anyhow::Result;
use daybook_core::{Dashboard, Window};
use owo_colors::OwoColorize;

use crate::render::{Render, format_date_label, local_date};

pub fn run(dashboard: &Dashboard, window: &Window, json: bool) -> Result<()> {
    let report = dashboard.get_timeline(window)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.timeline)?);
        if let Some(warning) = report.warning() {
            eprintln!("{}", warning);
        }
        return Ok(());
    }

    let timeline = &report.timeline;

    if timeline.is_empty() {
        println!("{}", "No events found".dimmed());
    }

    // Group occurrences by local day
    let mut current_date = None;

    for occurrence in &timeline.occurrences {
        let date = local_date(occurrence.occurrence_start);

        if current_date != Some(date) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", format_date_label(date).bold());
            current_date = Some(date);
        }

        let line = occurrence.render();
        if timeline.conflicts_for(&occurrence.id()).is_empty() {
            println!("  {}", line);
        } else {
            println!("  {} {}", line, "(conflict)".red());
        }
    }

    if !timeline.diagnostics.is_empty() {
        println!();
        for diagnostic in &timeline.diagnostics {
            println!("  {}", diagnostic.render());
        }
    }

    if let Some(warning) = report.warning() {
        println!();
        println!("{} {}", "!".yellow(), warning.yellow());
    }

    Ok(())
}
