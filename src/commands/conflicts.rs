use std::collections::HashMap;

use anyhow::Result;
use daybook_core::{Dashboard, Window};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};

pub fn run(dashboard: &Dashboard, window: &Window) -> Result<()> {
    let report = dashboard.get_timeline(window)?;
    let timeline = &report.timeline;

    if timeline.conflicts.is_empty() {
        println!("{}", "No conflicts".dimmed());
        return Ok(());
    }

    let titles: HashMap<String, &str> = timeline
        .occurrences
        .iter()
        .map(|o| (o.id(), o.title()))
        .collect();
    let title = |id: &str| titles.get(id).copied().unwrap_or(id).to_string();

    println!(
        "{} {}",
        timeline.conflicts.len(),
        pluralize("conflict", timeline.conflicts.len()).bold()
    );
    for conflict in &timeline.conflicts {
        println!(
            "  {} {} {} {}",
            conflict.render(),
            title(&conflict.occurrence_id_a),
            "overlaps".dimmed(),
            title(&conflict.occurrence_id_b)
        );
    }

    Ok(())
}
