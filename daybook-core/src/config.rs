//! daybook configuration at ~/.config/daybook/config.toml
//!
//! Every key can be overridden from the environment with a `DAYBOOK_` prefix,
//! e.g. `DAYBOOK_DEFAULT_TIMEZONE=Europe/Berlin`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::normalize::{ProviderKind, SourceContext};
use crate::recurrence::ExpansionLimits;
use crate::reminder::ReminderOffset;

static DEFAULT_DATA_DIR: &str = "~/.local/share/daybook";
static DEFAULT_REMINDER_HORIZON: &str = "2days";
static DEFAULT_TICK_INTERVAL: &str = "5s";
static DEFAULT_REMINDER_OFFSET: &str = "10m";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_reminder_horizon() -> String {
    DEFAULT_REMINDER_HORIZON.to_string()
}

fn default_tick_interval() -> String {
    DEFAULT_TICK_INTERVAL.to_string()
}

fn default_reminder_offsets() -> Vec<String> {
    vec![DEFAULT_REMINDER_OFFSET.to_string()]
}

fn default_max_instances() -> u16 {
    ExpansionLimits::default().max_instances
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub provider: ProviderKind,
    /// Lower number = higher precedence
    #[serde(default)]
    pub priority: i32,
    /// Zone for payloads that carry none; falls back to `default_timezone`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<Tz>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_timezone")]
    pub default_timezone: Tz,

    /// How far ahead reminders are kept scheduled (humantime, e.g. "2days")
    #[serde(default = "default_reminder_horizon")]
    pub reminder_horizon: String,

    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,

    /// Offsets for items without their own (humantime, e.g. "10m")
    #[serde(default = "default_reminder_offsets")]
    pub default_reminder_offsets: Vec<String>,

    #[serde(default = "default_max_instances")]
    pub max_instances: u16,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            data_dir: default_data_dir(),
            default_timezone: default_timezone(),
            reminder_horizon: default_reminder_horizon(),
            tick_interval: default_tick_interval(),
            default_reminder_offsets: default_reminder_offsets(),
            max_instances: default_max_instances(),
            sources: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn config_path() -> CoreResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Config("Could not determine config directory".into()))?
            .join("daybook");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the user config, creating a commented default file on first run.
    pub fn load() -> CoreResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CoreResult<Self> {
        let config: CoreConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("DAYBOOK")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("default_reminder_offsets"),
            )
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the fields the type system cannot.
    pub fn validate(&self) -> CoreResult<()> {
        self.reminder_horizon()?;
        self.tick_interval()?;
        self.default_reminder_offsets()?;

        if self.max_instances == 0 {
            return Err(CoreError::Config("max_instances must be positive".into()));
        }

        let mut ids: Vec<&str> = self.sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(CoreError::Config(format!(
                "source '{}' is configured twice",
                pair[0]
            )));
        }
        if let Some(bad) = self.sources.iter().find(|s| s.id.is_empty() || s.id.contains(':')) {
            return Err(CoreError::Config(format!(
                "invalid source id '{}' (must be non-empty and contain no ':')",
                bad.id
            )));
        }

        Ok(())
    }

    /// `data_dir` with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_context(&self, id: &str) -> CoreResult<SourceContext> {
        let source = self
            .source(id)
            .ok_or_else(|| CoreError::Config(format!("Unknown source '{}'", id)))?;

        Ok(SourceContext::new(
            &source.id,
            source.priority,
            source.timezone.unwrap_or(self.default_timezone),
        ))
    }

    pub fn expansion_limits(&self) -> ExpansionLimits {
        ExpansionLimits {
            max_instances: self.max_instances,
        }
    }

    pub fn reminder_horizon(&self) -> CoreResult<Duration> {
        parse_duration("reminder_horizon", &self.reminder_horizon)
    }

    pub fn tick_interval(&self) -> CoreResult<std::time::Duration> {
        let interval = humantime::parse_duration(&self.tick_interval)
            .map_err(|e| CoreError::Config(format!("tick_interval: {}", e)))?;
        if interval.is_zero() {
            return Err(CoreError::Config("tick_interval must be positive".into()));
        }
        Ok(interval)
    }

    pub fn default_reminder_offsets(&self) -> CoreResult<Vec<ReminderOffset>> {
        self.default_reminder_offsets
            .iter()
            .map(|s| {
                s.parse()
                    .map_err(|e| CoreError::Config(format!("default_reminder_offsets: {}", e)))
            })
            .collect()
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CoreResult<()> {
        let contents = format!(
            "\
# daybook configuration

# Where items and the fired-reminder log are kept:
# data_dir = \"{}\"

# Zone for sources that declare none:
# default_timezone = \"UTC\"

# How far ahead reminders are scheduled, and how often they are checked:
# reminder_horizon = \"{}\"
# tick_interval = \"{}\"

# Reminders for items without their own:
# default_reminder_offsets = [\"{}\"]

# Upper bound on occurrences expanded from one item per query:
# max_instances = {}

# One block per provider account. Lower priority wins duplicates.
# [[sources]]
# id = \"work\"
# provider = \"google\"
# priority = 1
# timezone = \"Europe/Berlin\"
",
            DEFAULT_DATA_DIR,
            DEFAULT_REMINDER_HORIZON,
            DEFAULT_TICK_INTERVAL,
            DEFAULT_REMINDER_OFFSET,
            default_max_instances()
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Save the current config, replacing comments with the plain values.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| CoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn parse_duration(field: &str, value: &str) -> CoreResult<Duration> {
    let std = humantime::parse_duration(value)
        .map_err(|e| CoreError::Config(format!("{}: {}", field, e)))?;
    Duration::from_std(std).map_err(|e| CoreError::Config(format!("{}: {}", field, e)))
}
