//! Error types for daybook.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in daybook operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Invalid item '{id}': {reason}")]
    InvalidItem { id: String, reason: String },

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(
        "Reminder {offset_minutes}m before '{item_id}' would fire in the past (at {fire_at})"
    )]
    Validation {
        item_id: String,
        offset_minutes: i64,
        fire_at: DateTime<Utc>,
    },

    #[error("Invalid reminder offset: {0}")]
    InvalidOffset(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while turning a provider payload into a canonical item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Payload is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Could not parse {field} '{value}'")]
    InvalidDateTime { field: &'static str, value: String },

    #[error("Unsupported recurrence: {0}")]
    UnsupportedRecurrence(String),

    #[error("Invalid recurrence: {0}")]
    InvalidRule(String),

    #[error("Item ends before it starts")]
    EndBeforeStart,

    #[error("Instance edit refers to unknown recurring item '{0}'")]
    OrphanInstance(String),
}

/// Result type alias for daybook operations.
pub type CoreResult<T> = Result<T, CoreError>;
