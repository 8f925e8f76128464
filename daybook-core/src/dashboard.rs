//! The dashboard: ingest provider payloads, answer timeline queries and keep
//! reminders in step with the stored items.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::cache::OccurrenceCache;
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::merge::{ConflictMarker, MergedTimeline, SourceOccurrences, merge};
use crate::normalize::{PayloadFailure, ProviderPayload, SourceContext, normalize_batch};
use crate::recurrence::ExpansionLimits;
use crate::reminder::{ReconcileReport, Reminder, ReminderOffset, ReminderScheduler};
use crate::sink::{Notification, NotificationSink};
use crate::store::{FiredLog, ItemRepository};
use crate::window::Window;

/// Tunables, normally taken from [`CoreConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardOptions {
    pub limits: ExpansionLimits,
    pub default_reminder_offsets: Vec<ReminderOffset>,
    pub reminder_horizon: Duration,
}

impl DashboardOptions {
    pub fn from_config(config: &CoreConfig) -> CoreResult<Self> {
        Ok(DashboardOptions {
            limits: config.expansion_limits(),
            default_reminder_offsets: config.default_reminder_offsets()?,
            reminder_horizon: config.reminder_horizon()?,
        })
    }
}

impl Default for DashboardOptions {
    fn default() -> Self {
        DashboardOptions {
            limits: ExpansionLimits::default(),
            default_reminder_offsets: vec![ReminderOffset::DEFAULT],
            reminder_horizon: Duration::days(2),
        }
    }
}

/// An item that could not be expanded for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: String,
    pub source_id: String,
    pub error: String,
}

/// A merged timeline plus the items left out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineReport {
    pub timeline: MergedTimeline,
    pub failures: Vec<ItemFailure>,
}

impl TimelineReport {
    /// One non-blocking warning naming every item that failed, if any did.
    pub fn warning(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }

        let ids: Vec<&str> = self.failures.iter().map(|f| f.item_id.as_str()).collect();
        let noun = if ids.len() == 1 { "item" } else { "items" };
        Some(format!(
            "{} {} could not be shown: {}",
            ids.len(),
            noun,
            ids.join(", ")
        ))
    }
}

/// Result of ingesting one provider batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub source_id: String,
    pub stored: usize,
    /// Items removed because the provider cancelled or deleted them
    pub removed: usize,
    pub failures: Vec<PayloadFailure>,
    /// Normalized items the repository refused to store
    pub rejected: Vec<ItemFailure>,
}

pub struct Dashboard {
    items: Arc<dyn ItemRepository>,
    scheduler: Arc<ReminderScheduler>,
    cache: OccurrenceCache,
    options: DashboardOptions,
}

impl Dashboard {
    /// Recovers the reminder scheduler from `fired_log`. Call
    /// [`Dashboard::sync_reminders`] afterwards to rebuild pending reminders.
    pub fn new(
        items: Arc<dyn ItemRepository>,
        fired_log: Arc<dyn FiredLog>,
        options: DashboardOptions,
    ) -> CoreResult<Self> {
        let scheduler = Arc::new(ReminderScheduler::new(fired_log)?);

        Ok(Dashboard {
            items,
            scheduler,
            cache: OccurrenceCache::new(options.limits),
            options,
        })
    }

    pub fn items(&self) -> &Arc<dyn ItemRepository> {
        &self.items
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    /// Normalize and store a provider batch.
    ///
    /// Payloads that fail are reported and skipped; the rest are stored.
    /// Payloads cancelled upstream remove their item and its pending reminders.
    pub fn ingest(
        &self,
        source: &SourceContext,
        payloads: &[ProviderPayload],
    ) -> CoreResult<IngestReport> {
        let batch = normalize_batch(payloads, source);
        let mut report = IngestReport {
            source_id: source.source_id.clone(),
            failures: batch.failures,
            ..IngestReport::default()
        };

        for item in batch.items {
            let id = item.id.clone();
            match self.items.upsert(item) {
                Ok(()) => {
                    self.cache.invalidate(&id);
                    report.stored += 1;
                }
                Err(e) => {
                    log::warn!("Could not store '{}': {}", id, e);
                    report.rejected.push(ItemFailure {
                        item_id: id,
                        source_id: source.source_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for id in batch.cancelled {
            if self.items.remove(&id)? {
                self.cache.invalidate(&id);
                self.scheduler.cancel_item(&id);
                report.removed += 1;
            }
        }

        log::info!(
            "Ingested {} items from '{}' ({} removed, {} failed)",
            report.stored,
            report.source_id,
            report.removed,
            report.failures.len() + report.rejected.len()
        );
        Ok(report)
    }

    /// The merged timeline for `window`.
    ///
    /// Items that fail to expand are left out and listed in the report.
    pub fn get_timeline(&self, window: &Window) -> CoreResult<TimelineReport> {
        let mut by_source: BTreeMap<String, Vec<_>> = BTreeMap::new();
        let mut failures = Vec::new();

        for item in self.items.items()? {
            match self.cache.occurrences(&item, window) {
                Ok(occurrences) => by_source
                    .entry(item.source_id.clone())
                    .or_default()
                    .extend(occurrences),
                Err(e) => {
                    log::warn!("Could not expand '{}': {}", item.id, e);
                    failures.push(ItemFailure {
                        item_id: item.id.clone(),
                        source_id: item.source_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let sets: Vec<SourceOccurrences> = by_source
            .into_iter()
            .map(|(source_id, occurrences)| SourceOccurrences {
                source_id,
                occurrences,
            })
            .collect();

        Ok(TimelineReport {
            timeline: merge(&sets, window),
            failures,
        })
    }

    pub fn get_conflicts(&self, window: &Window) -> CoreResult<Vec<ConflictMarker>> {
        Ok(self.get_timeline(window)?.timeline.conflicts)
    }

    /// Set per-item reminder offsets. Takes effect on the next sync.
    pub fn set_reminder_offsets(&self, item_id: &str, offsets: Vec<ReminderOffset>) -> CoreResult<()> {
        self.items.set_reminder_offsets(item_id, offsets)
    }

    /// The reminders the current items want to fire within the horizon after `now`.
    ///
    /// Occurrences are looked up over the horizon plus the longest offset in
    /// use, so a lead time longer than the horizon is still planned before it
    /// is due. The returned window is that lookup window.
    pub fn planned_reminders(&self, now: DateTime<Utc>) -> CoreResult<(Window, Vec<Reminder>)> {
        let horizon_end = now + self.options.reminder_horizon;
        let window = Window::starting_at(now, self.options.reminder_horizon + self.longest_offset()?)?;
        let report = self.get_timeline(&window)?;

        let mut planned = Vec::new();
        let mut offsets_by_item: BTreeMap<&str, Vec<ReminderOffset>> = BTreeMap::new();

        for occurrence in &report.timeline.occurrences {
            if !offsets_by_item.contains_key(occurrence.item_id.as_str()) {
                let offsets = self
                    .items
                    .reminder_offsets(&occurrence.item_id)?
                    .unwrap_or_else(|| self.options.default_reminder_offsets.clone());
                offsets_by_item.insert(&occurrence.item_id, offsets);
            }

            for offset in &offsets_by_item[occurrence.item_id.as_str()] {
                let reminder = Reminder::plan(occurrence, *offset);
                if reminder.fire_at < horizon_end {
                    planned.push(reminder);
                }
            }
        }

        Ok((window, planned))
    }

    fn longest_offset(&self) -> CoreResult<Duration> {
        let mut longest = self.options.default_reminder_offsets.iter().max().copied();
        for item in self.items.items()? {
            if let Some(offsets) = self.items.reminder_offsets(&item.id)? {
                longest = longest.max(offsets.into_iter().max());
            }
        }
        Ok(longest.map(|o| o.as_duration()).unwrap_or_else(Duration::zero))
    }

    /// Reconcile the scheduler with the items over the reminder horizon.
    pub fn sync_reminders(&self, now: DateTime<Utc>) -> CoreResult<ReconcileReport> {
        let (window, planned) = self.planned_reminders(now)?;
        Ok(self.scheduler.reconcile(&planned, &window, now))
    }

    /// Fire due reminders and hand them to `sink`.
    ///
    /// Delivery failures are logged; the reminder still counts as fired.
    pub fn tick(&self, now: DateTime<Utc>, sink: &dyn NotificationSink) -> Vec<Reminder> {
        let fired = self.scheduler.tick(now);

        for reminder in &fired {
            if let Err(e) = sink.deliver(&Notification::from(reminder)) {
                log::warn!("Could not deliver reminder for '{}': {}", reminder.item_id, e);
            }
        }

        fired
    }
}
