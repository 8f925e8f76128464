use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use daybook_core::Dashboard;
use owo_colors::OwoColorize;

use crate::sink::ConsoleSink;

pub async fn run(dashboard: Arc<Dashboard>, tick_interval: Duration) -> Result<()> {
    let report = dashboard.sync_reminders(Utc::now())?;
    println!(
        "{}",
        format!(
            "Watching for reminders every {} ({} scheduled, {} missed). Ctrl-C to stop.",
            humantime::format_duration(tick_interval),
            report.scheduled,
            report.missed
        )
        .dimmed()
    );

    let mut interval = tokio::time::interval(tick_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                // Pick up items imported by other daybook invocations
                if let Err(e) = dashboard.sync_reminders(now) {
                    log::warn!("Could not sync reminders: {}", e);
                }
                let fired = dashboard.tick(now, &ConsoleSink);
                log::debug!("Tick at {} fired {} reminders", now, fired.len());
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    Ok(())
}
