//! Merging per-source occurrences into one timeline.
//!
//! Merge never fails: occurrences it cannot place are dropped and reported as
//! [`MergeDiagnostic`]s next to the timeline.

mod conflict;
mod diagnostic;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::occurrence::Occurrence;
use crate::window::Window;

pub use conflict::ConflictMarker;
pub use diagnostic::MergeDiagnostic;

/// Occurrences expanded from one source.
#[derive(Debug, Clone, Default)]
pub struct SourceOccurrences {
    pub source_id: String,
    pub occurrences: Vec<Occurrence>,
}

impl SourceOccurrences {
    pub fn new(source_id: &str, occurrences: Vec<Occurrence>) -> Self {
        SourceOccurrences {
            source_id: source_id.to_string(),
            occurrences,
        }
    }
}

/// The unified, sorted, de-duplicated view of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTimeline {
    pub window: Window,
    pub occurrences: Vec<Occurrence>,
    pub conflicts: Vec<ConflictMarker>,
    pub diagnostics: Vec<MergeDiagnostic>,
}

impl MergedTimeline {
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Conflict markers that involve the given occurrence.
    pub fn conflicts_for(&self, occurrence_id: &str) -> Vec<&ConflictMarker> {
        self.conflicts
            .iter()
            .filter(|c| c.occurrence_id_a == occurrence_id || c.occurrence_id_b == occurrence_id)
            .collect()
    }
}

type DuplicateKey = (String, DateTime<Utc>, DateTime<Utc>);

/// Merge occurrence sets from several sources into one timeline.
///
/// Occurrences are ordered by start, then source priority (lower first), then
/// item id and original instant. Copies of the same (title, start, end) from
/// different sources collapse onto the highest-precedence one.
pub fn merge(sets: &[SourceOccurrences], window: &Window) -> MergedTimeline {
    let mut diagnostics = Vec::new();
    let mut candidates: Vec<&Occurrence> = Vec::new();

    for set in sets {
        for occ in &set.occurrences {
            if occ.source_id() != set.source_id {
                diagnostics.push(MergeDiagnostic::SourceMismatch {
                    occurrence_id: occ.id(),
                    set_source: set.source_id.clone(),
                    item_source: occ.source_id().to_string(),
                });
                continue;
            }
            if !occ.is_well_formed() {
                diagnostics.push(MergeDiagnostic::Malformed {
                    occurrence_id: occ.id(),
                    start: occ.occurrence_start,
                    end: occ.occurrence_end,
                });
                continue;
            }
            if !window.contains(occ.occurrence_start) {
                continue;
            }
            candidates.push(occ);
        }
    }

    candidates.sort_by(|a, b| {
        a.occurrence_start
            .cmp(&b.occurrence_start)
            .then_with(|| a.source_priority().cmp(&b.source_priority()))
            .then_with(|| a.source_id().cmp(b.source_id()))
            .then_with(|| a.item_id.cmp(&b.item_id))
            .then_with(|| a.original_start.cmp(&b.original_start))
    });

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut winners: HashMap<DuplicateKey, &str> = HashMap::new();
    let mut occurrences = Vec::with_capacity(candidates.len());

    for occ in candidates {
        let id = occ.id();
        if !seen_ids.insert(id.clone()) {
            diagnostics.push(MergeDiagnostic::DuplicateId {
                occurrence_id: id,
                source_id: occ.source_id().to_string(),
            });
            continue;
        }

        let key = (
            occ.title().to_string(),
            occ.occurrence_start,
            occ.occurrence_end,
        );
        match winners.get(&key) {
            Some(winner) if *winner != occ.source_id() => {
                log::debug!("Dropping {} as a duplicate from source '{}'", id, winner);
                continue;
            }
            Some(_) => {}
            None => {
                winners.insert(key, occ.source_id());
            }
        }

        occurrences.push(occ.clone());
    }

    for diagnostic in &diagnostics {
        log::warn!("Merge: {}", diagnostic);
    }

    let conflicts = conflict::find_conflicts(&occurrences);

    MergedTimeline {
        window: *window,
        occurrences,
        conflicts,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::make_test_item;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn day() -> Window {
        Window::new(at(0, 0), at(0, 0) + Duration::days(1)).unwrap()
    }

    fn occ(source: &str, priority: i32, native: &str, title: &str, start: DateTime<Utc>) -> Occurrence {
        let mut item = make_test_item(&format!("{}:{}", source, native), start, 60);
        item.title = title.to_string();
        item.source_id = source.to_string();
        item.source_priority = priority;
        Occurrence::single(&item)
    }

    #[test]
    fn test_duplicates_keep_highest_precedence_source() {
        let sets = vec![
            SourceOccurrences::new("home", vec![occ("home", 2, "x", "Lunch", at(12, 0))]),
            SourceOccurrences::new("work", vec![occ("work", 1, "y", "Lunch", at(12, 0))]),
        ];
        let timeline = merge(&sets, &day());

        assert_eq!(timeline.occurrences.len(), 1);
        assert_eq!(timeline.occurrences[0].source_id(), "work");
        assert!(timeline.conflicts.is_empty());
    }

    #[test]
    fn test_equal_priority_duplicates_go_to_first_source_id() {
        let with_id = |source: &str, id: &str| {
            let mut item = make_test_item(id, at(12, 0), 60);
            item.title = "Lunch".to_string();
            item.source_id = source.to_string();
            item.source_priority = 1;
            Occurrence::single(&item)
        };
        let sets = vec![
            SourceOccurrences::new("beta", vec![with_id("beta", "a-item")]),
            SourceOccurrences::new("alpha", vec![with_id("alpha", "z-item")]),
        ];
        let timeline = merge(&sets, &day());

        assert_eq!(timeline.occurrences.len(), 1);
        assert_eq!(timeline.occurrences[0].source_id(), "alpha");
    }

    #[test]
    fn test_same_source_copies_are_not_duplicates() {
        let sets = vec![SourceOccurrences::new(
            "work",
            vec![
                occ("work", 1, "a", "Review", at(9, 0)),
                occ("work", 1, "b", "Review", at(9, 0)),
            ],
        )];
        let timeline = merge(&sets, &day());

        assert_eq!(timeline.occurrences.len(), 2);
        assert_eq!(timeline.conflicts.len(), 1);
    }

    #[test]
    fn test_sort_order() {
        let sets = vec![
            SourceOccurrences::new(
                "b",
                vec![occ("b", 2, "1", "Late", at(15, 0)), occ("b", 2, "2", "Early", at(8, 0))],
            ),
            SourceOccurrences::new("a", vec![occ("a", 1, "3", "Same time", at(15, 0))]),
        ];
        let timeline = merge(&sets, &day());
        let ids: Vec<&str> = timeline.occurrences.iter().map(|o| o.item_id.as_str()).collect();

        assert_eq!(ids, vec!["b:2", "a:3", "b:1"]);
    }

    #[test]
    fn test_malformed_and_mismatched_are_reported() {
        let mut backwards = occ("a", 1, "bad", "Backwards", at(10, 0));
        backwards.occurrence_end = at(9, 0);
        let stray = occ("other", 1, "stray", "Stray", at(11, 0));

        let sets = vec![SourceOccurrences::new(
            "a",
            vec![backwards, stray, occ("a", 1, "ok", "Fine", at(12, 0))],
        )];
        let timeline = merge(&sets, &day());

        assert_eq!(timeline.occurrences.len(), 1);
        assert_eq!(timeline.diagnostics.len(), 2);
        assert!(matches!(timeline.diagnostics[0], MergeDiagnostic::Malformed { .. }));
        assert!(matches!(timeline.diagnostics[1], MergeDiagnostic::SourceMismatch { .. }));
    }

    #[test]
    fn test_repeated_occurrence_id_is_dropped() {
        let one = occ("a", 1, "dup", "Twice", at(10, 0));
        let sets = vec![SourceOccurrences::new("a", vec![one.clone(), one])];
        let timeline = merge(&sets, &day());

        assert_eq!(timeline.occurrences.len(), 1);
        assert!(matches!(timeline.diagnostics[0], MergeDiagnostic::DuplicateId { .. }));
    }

    #[test]
    fn test_outside_window_is_filtered() {
        let sets = vec![SourceOccurrences::new(
            "a",
            vec![occ("a", 1, "tomorrow", "Later", at(0, 0) + Duration::days(1))],
        )];
        let timeline = merge(&sets, &day());

        assert!(timeline.is_empty());
        assert!(timeline.diagnostics.is_empty());
    }

    #[test]
    fn test_merge_is_deterministic() {
        let sets = vec![
            SourceOccurrences::new("a", vec![occ("a", 1, "1", "One", at(9, 0))]),
            SourceOccurrences::new("b", vec![occ("b", 2, "2", "Two", at(9, 30))]),
        ];
        let first = serde_json::to_string(&merge(&sets, &day())).unwrap();
        let second = serde_json::to_string(&merge(&sets, &day())).unwrap();
        assert_eq!(first, second);
    }
}
