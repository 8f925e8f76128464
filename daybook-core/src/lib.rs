//! Core of daybook: one timeline over several calendar and task providers.
//!
//! - [`normalize`] turns provider payloads into [`CanonicalItem`]s
//! - [`recurrence`] expands items into [`Occurrence`]s for a [`Window`]
//! - [`merge`] builds one de-duplicated, conflict-marked timeline
//! - [`reminder`] schedules and fires reminders, surviving restarts
//!
//! [`Dashboard`] ties these together over an [`ItemRepository`].

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod item;
pub mod merge;
pub mod normalize;
pub mod occurrence;
pub mod recurrence;
pub mod reminder;
pub mod sink;
pub mod store;
pub mod window;

pub use config::{CoreConfig, SourceConfig};
pub use dashboard::{Dashboard, DashboardOptions, IngestReport, ItemFailure, TimelineReport};
pub use error::{CoreError, CoreResult, NormalizationError};
pub use item::{CanonicalItem, ItemKind};
pub use merge::{ConflictMarker, MergeDiagnostic, MergedTimeline, SourceOccurrences, merge};
pub use normalize::{ProviderKind, ProviderPayload, SourceContext, normalize, normalize_batch};
pub use occurrence::Occurrence;
pub use recurrence::{ExpansionLimits, Frequency, RecurrenceRule, expand};
pub use reminder::{
    ReconcileReport, Reminder, ReminderKey, ReminderOffset, ReminderScheduler, ReminderState,
};
pub use sink::{MemorySink, Notification, NotificationSink};
pub use store::{FiredLog, FileStore, ItemRepository, MemoryStore};
pub use window::Window;
