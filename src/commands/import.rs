use std::path::Path;

use anyhow::{Context, Result};
use daybook_core::{CoreConfig, Dashboard, normalize::decode_payloads};
use owo_colors::OwoColorize;

use crate::render::pluralize;

pub fn run(config: &CoreConfig, dashboard: &Dashboard, source_id: &str, file: &Path) -> Result<()> {
    let Some(source) = config.source(source_id) else {
        let available: Vec<&str> = config.sources.iter().map(|s| s.id.as_str()).collect();
        if available.is_empty() {
            anyhow::bail!(
                "Unknown source '{}'. No sources configured in {}",
                source_id,
                CoreConfig::config_path()?.display()
            );
        }
        anyhow::bail!(
            "Unknown source '{}'. Available sources: {}",
            source_id,
            available.join(", ")
        );
    };

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let decoded = decode_payloads(source.provider, &content)?;

    let context = config.source_context(source_id)?;
    let report = dashboard.ingest(&context, &decoded.payloads)?;

    println!(
        "{} {} {} into {}",
        "✓".green(),
        report.stored,
        pluralize("item", report.stored),
        source_id.bold()
    );
    if report.removed > 0 {
        println!(
            "  {} {} removed upstream",
            report.removed,
            pluralize("item", report.removed)
        );
    }

    let failures = decoded.failures.iter().chain(report.failures.iter());
    for failure in failures {
        let name = if failure.native_id.is_empty() {
            format!("#{}", failure.index)
        } else {
            failure.native_id.clone()
        };
        println!("  {} {}: {}", "✗".red(), name, failure.error.to_string().dimmed());
    }
    for rejected in &report.rejected {
        println!("  {} {}: {}", "✗".red(), rejected.item_id, rejected.error.dimmed());
    }

    Ok(())
}
