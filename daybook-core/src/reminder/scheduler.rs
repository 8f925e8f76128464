//! Min-heap reminder scheduler.
//!
//! All state sits behind one mutex, so `schedule`, `cancel`, `reconcile` and
//! `tick` are serialized. The heap is never persisted: after a restart the
//! fired keys come from the [`FiredLog`] and pending reminders are rebuilt
//! with [`ReminderScheduler::reconcile`].

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Reminder, ReminderKey, ReminderOffset, ReminderState};
use crate::error::{CoreError, CoreResult};
use crate::occurrence::Occurrence;
use crate::store::FiredLog;
use crate::window::Window;

/// Heap order: fire time, then item id, then occurrence and offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    fire_at: DateTime<Utc>,
    item_id: String,
    occurrence_start: DateTime<Utc>,
    offset_minutes: i64,
    generation: u64,
}

impl HeapEntry {
    fn key(&self) -> ReminderKey {
        ReminderKey {
            item_id: self.item_id.clone(),
            occurrence_start: self.occurrence_start,
            offset_minutes: self.offset_minutes,
        }
    }
}

#[derive(Debug)]
struct Slot {
    reminder: Reminder,
    /// Heap entries from older generations are stale
    generation: u64,
}

#[derive(Debug, Default)]
struct State {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    slots: HashMap<ReminderKey, Slot>,
    fired: HashSet<ReminderKey>,
    next_generation: u64,
}

impl State {
    fn is_live(&self, entry: &HeapEntry) -> bool {
        self.slots
            .get(&entry.key())
            .is_some_and(|slot| slot.generation == entry.generation && slot.reminder.is_pending())
    }

    /// Whether a reminder with this key is pending or has fired.
    fn is_known(&self, key: &ReminderKey) -> bool {
        self.fired.contains(key)
            || self
                .slots
                .get(key)
                .is_some_and(|slot| slot.reminder.is_pending())
    }

    fn insert(&mut self, mut reminder: Reminder) -> Reminder {
        reminder.state = ReminderState::Pending;
        let generation = self.next_generation;
        self.next_generation += 1;

        self.heap.push(Reverse(HeapEntry {
            fire_at: reminder.fire_at,
            item_id: reminder.item_id.clone(),
            occurrence_start: reminder.occurrence_start,
            offset_minutes: reminder.offset.as_minutes(),
            generation,
        }));
        self.slots.insert(
            reminder.key(),
            Slot {
                reminder: reminder.clone(),
                generation,
            },
        );

        log::debug!("Scheduled reminder {} at {}", reminder.key(), reminder.fire_at);
        reminder
    }

    fn cancel_where(&mut self, mut matches: impl FnMut(&Reminder) -> bool) -> usize {
        let mut cancelled = 0;
        for slot in self.slots.values_mut() {
            if slot.reminder.is_pending() && matches(&slot.reminder) {
                slot.reminder.state = ReminderState::Cancelled;
                log::debug!("Cancelled reminder {}", slot.reminder.key());
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop stale entries off the top of the heap.
    fn skip_stale(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_live(top) {
                break;
            }
            self.heap.pop();
        }
    }
}

/// What a [`ReminderScheduler::reconcile`] pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub cancelled: usize,
    /// Scheduled with a fire time already in the past (fire on next tick)
    pub missed: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.scheduled == 0 && self.cancelled == 0
    }
}

pub struct ReminderScheduler {
    state: Mutex<State>,
    fired_log: Arc<dyn FiredLog>,
}

impl ReminderScheduler {
    /// Create a scheduler, loading the keys of every reminder that already fired.
    pub fn new(fired_log: Arc<dyn FiredLog>) -> CoreResult<Self> {
        let fired: HashSet<ReminderKey> = fired_log.fired_keys()?.into_iter().collect();
        log::info!("Reminder scheduler loaded {} fired reminders", fired.len());

        Ok(ReminderScheduler {
            state: Mutex::new(State {
                fired,
                ..State::default()
            }),
            fired_log,
        })
    }

    /// Schedule reminders `offsets` before an occurrence.
    ///
    /// Fails without scheduling anything if any offset would fire before `now`.
    /// An occurrence that has already started instead gets one reminder that
    /// fires at `now`, keyed by the smallest offset. Keys that are pending or
    /// have fired are skipped; the returned list holds only new reminders.
    pub fn schedule(
        &self,
        occurrence: &Occurrence,
        offsets: &[ReminderOffset],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Reminder>> {
        let Some(smallest) = offsets.iter().min().copied() else {
            return Ok(Vec::new());
        };

        let planned: Vec<Reminder> = if occurrence.occurrence_start <= now {
            let mut reminder = Reminder::plan(occurrence, smallest);
            reminder.fire_at = now;
            vec![reminder]
        } else {
            let mut offsets = offsets.to_vec();
            offsets.sort();
            offsets.dedup();

            let planned: Vec<Reminder> = offsets
                .into_iter()
                .map(|offset| Reminder::plan(occurrence, offset))
                .collect();

            if let Some(past) = planned.iter().find(|r| r.fire_at < now) {
                return Err(CoreError::Validation {
                    item_id: occurrence.item_id.clone(),
                    offset_minutes: past.offset.as_minutes(),
                    fire_at: past.fire_at,
                });
            }
            planned
        };

        let mut state = self.state.lock();
        let mut scheduled = Vec::with_capacity(planned.len());
        for reminder in planned {
            if !state.is_known(&reminder.key()) {
                scheduled.push(state.insert(reminder));
            }
        }
        Ok(scheduled)
    }

    /// Cancel the pending reminders of one occurrence. Idempotent.
    pub fn cancel(&self, item_id: &str, occurrence_start: DateTime<Utc>) -> usize {
        self.state
            .lock()
            .cancel_where(|r| r.item_id == item_id && r.occurrence_start == occurrence_start)
    }

    /// Cancel every pending reminder of an item.
    pub fn cancel_item(&self, item_id: &str) -> usize {
        self.state.lock().cancel_where(|r| r.item_id == item_id)
    }

    /// Fire every pending reminder due at `now`, in fire-time order.
    ///
    /// Each reminder is recorded in the fired log before it is returned, and
    /// is returned exactly once. If the log cannot be written the reminder
    /// stays pending and the tick stops early.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let mut state = self.state.lock();
        let mut fired = Vec::new();

        loop {
            state.skip_stale();
            let due = match state.heap.peek() {
                Some(Reverse(top)) if top.fire_at <= now => top.key(),
                _ => break,
            };

            if let Err(e) = self.fired_log.append(&due) {
                log::error!("Could not record fired reminder {}: {}", due, e);
                break;
            }

            state.heap.pop();
            state.fired.insert(due.clone());
            if let Some(slot) = state.slots.remove(&due) {
                let mut reminder = slot.reminder;
                reminder.state = ReminderState::Fired;
                log::info!("Fired reminder {}", due);
                fired.push(reminder);
            }
        }

        fired
    }

    /// Bring pending reminders in line with the reminders an up-to-date
    /// expansion wants for `window`.
    ///
    /// Pending reminders in the window that are no longer wanted, or were
    /// planned from an older item version, are cancelled. Wanted reminders
    /// that are neither pending nor fired are scheduled, including ones whose
    /// fire time passed while nothing was running, as long as the occurrence
    /// itself is still ahead. Those fire on the next tick.
    pub fn reconcile(
        &self,
        desired: &[Reminder],
        window: &Window,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let wanted: HashMap<ReminderKey, &Reminder> =
            desired.iter().map(|r| (r.key(), r)).collect();

        let mut state = self.state.lock();

        report.cancelled = state.cancel_where(|pending| {
            if !window.contains(pending.occurrence_start) {
                return false;
            }
            match wanted.get(&pending.key()) {
                Some(want) => want.item_version != pending.item_version,
                None => true,
            }
        });

        // Forget cancelled reminders that can no longer be rescheduled
        state
            .slots
            .retain(|_, slot| slot.reminder.is_pending() || slot.reminder.occurrence_start > now);

        let mut keys: Vec<&ReminderKey> = wanted.keys().collect();
        keys.sort();

        for key in keys {
            let want = wanted[key];
            if state.is_known(key) || want.occurrence_start <= now {
                continue;
            }
            if want.fire_at < now {
                log::info!("Reminder {} was missed, firing late", key);
                report.missed += 1;
            }
            state.insert(want.clone());
            report.scheduled += 1;
        }

        if !report.is_empty() {
            log::debug!(
                "Reconciled reminders: {} scheduled, {} cancelled",
                report.scheduled,
                report.cancelled
            );
        }
        report
    }

    /// Snapshot of the pending reminders, in fire order.
    pub fn pending(&self) -> Vec<Reminder> {
        let state = self.state.lock();
        let mut pending: Vec<Reminder> = state
            .slots
            .values()
            .filter(|slot| slot.reminder.is_pending())
            .map(|slot| slot.reminder.clone())
            .collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.key().cmp(&b.key())));
        pending
    }

    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        state.skip_stale();
        state.heap.peek().map(|Reverse(top)| top.fire_at)
    }

    pub fn has_fired(&self, key: &ReminderKey) -> bool {
        self.state.lock().fired.contains(key)
    }
}
