use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an occurrence was left out of a merged timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeDiagnostic {
    /// Ends before it starts
    Malformed {
        occurrence_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Handed in under a source it does not belong to
    SourceMismatch {
        occurrence_id: String,
        set_source: String,
        item_source: String,
    },
    /// Same occurrence id seen more than once
    DuplicateId {
        occurrence_id: String,
        source_id: String,
    },
}

impl MergeDiagnostic {
    pub fn occurrence_id(&self) -> &str {
        match self {
            MergeDiagnostic::Malformed { occurrence_id, .. }
            | MergeDiagnostic::SourceMismatch { occurrence_id, .. }
            | MergeDiagnostic::DuplicateId { occurrence_id, .. } => occurrence_id,
        }
    }
}

impl fmt::Display for MergeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeDiagnostic::Malformed {
                occurrence_id,
                start,
                end,
            } => write!(
                f,
                "{} ends ({}) before it starts ({})",
                occurrence_id,
                end.to_rfc3339(),
                start.to_rfc3339()
            ),
            MergeDiagnostic::SourceMismatch {
                occurrence_id,
                set_source,
                item_source,
            } => write!(
                f,
                "{} belongs to source '{}' but was merged as '{}'",
                occurrence_id, item_source, set_source
            ),
            MergeDiagnostic::DuplicateId {
                occurrence_id,
                source_id,
            } => write!(f, "{} repeated by source '{}'", occurrence_id, source_id),
        }
    }
}
