//! Canonical, provider-neutral item records.
//!
//! Every provider payload is normalized into a [`CanonicalItem`]. The rest of
//! the core (expansion, merging, reminders) works exclusively with these.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::recurrence::RecurrenceRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Event,
    Task,
}

/// An event or task (provider-neutral)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    /// Source-qualified id, see [`CanonicalItem::qualified_id`]
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    /// Optional for tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Zone the recurrence is evaluated in (wall-clock times survive DST)
    pub timezone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
    pub source_id: String,
    /// Lower number = higher precedence
    pub source_priority: i32,
    pub last_modified: DateTime<Utc>,
}

impl CanonicalItem {
    /// Build a globally unique id from a source id and the provider's own id.
    pub fn qualified_id(source_id: &str, native_id: &str) -> String {
        format!("{}:{}", source_id, native_id)
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Length of a single occurrence. Items without an end have zero duration.
    pub fn duration(&self) -> Duration {
        self.end
            .map(|end| end - self.start)
            .unwrap_or_else(Duration::zero)
    }

    /// Check the item invariants, including its recurrence rule.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(end) = self.end {
            if end < self.start {
                return Err(CoreError::InvalidItem {
                    id: self.id.clone(),
                    reason: format!("end {} is before start {}", end, self.start),
                });
            }
        }

        if let Some(rule) = &self.recurrence {
            rule.validate()?;

            for (original, edit) in &rule.overrides {
                if edit.recurrence.is_some() {
                    return Err(CoreError::InvalidRule(format!(
                        "override for {} of '{}' carries its own recurrence",
                        original, self.id
                    )));
                }
                if let Some(end) = edit.end {
                    if end < edit.start {
                        return Err(CoreError::InvalidItem {
                            id: self.id.clone(),
                            reason: format!("override for {} ends before it starts", original),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for CanonicalItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}
