mod commands;
mod render;
mod sink;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use daybook_core::{CoreConfig, Dashboard, DashboardOptions, FileStore, Window};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "One timeline over your calendars and task lists, with reminders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a provider export (JSON array of payloads) into a source
    Import {
        /// Source id from config.toml
        source: String,

        /// Path to the JSON file
        file: std::path::PathBuf,
    },
    /// Show the merged timeline
    Timeline {
        /// Start date (YYYY-MM-DD or "today")
        #[arg(long)]
        from: Option<String>,

        /// End date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print the timeline as JSON
        #[arg(long)]
        json: bool,
    },
    /// List overlapping events
    Conflicts {
        /// Start date (YYYY-MM-DD or "today")
        #[arg(long)]
        from: Option<String>,

        /// End date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Set the reminders for an item (e.g. `daybook remind work:abc 10m 1h`)
    Remind {
        item_id: String,

        /// Lead times such as 10m, 1h, 2days. None clears the item's reminders.
        offsets: Vec<String>,
    },
    /// Keep reminders scheduled and print them as they fire
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = CoreConfig::load()?;

    match cli.command {
        Commands::Import { source, file } => {
            let dashboard = open_dashboard(&config)?;
            commands::import::run(&config, &dashboard, &source, &file)
        }
        Commands::Timeline { from, to, json } => {
            let dashboard = open_dashboard(&config)?;
            let window = Window::from_args(from.as_deref(), to.as_deref(), Utc::now())?;
            commands::timeline::run(&dashboard, &window, json)
        }
        Commands::Conflicts { from, to } => {
            let dashboard = open_dashboard(&config)?;
            let window = Window::from_args(from.as_deref(), to.as_deref(), Utc::now())?;
            commands::conflicts::run(&dashboard, &window)
        }
        Commands::Remind { item_id, offsets } => {
            let dashboard = open_dashboard(&config)?;
            commands::remind::run(&dashboard, &item_id, &offsets)
        }
        Commands::Watch => {
            let dashboard = Arc::new(open_dashboard(&config)?);
            commands::watch::run(dashboard, config.tick_interval()?).await
        }
    }
}

fn open_dashboard(config: &CoreConfig) -> Result<Dashboard> {
    let store = Arc::new(FileStore::open(config.data_path())?);
    let options = DashboardOptions::from_config(config)?;

    Ok(Dashboard::new(store.clone(), store, options)?)
}
