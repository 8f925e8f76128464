use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemKind;
use crate::occurrence::Occurrence;

/// Two event occurrences whose time ranges intersect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictMarker {
    /// The occurrence that started first (or sorted first on a tie)
    pub occurrence_id_a: String,
    pub occurrence_id_b: String,
    pub overlap_start: DateTime<Utc>,
    pub overlap_end: DateTime<Utc>,
}

/// Sweep sorted occurrences and mark every intersecting pair of events.
///
/// `occurrences` must be sorted by start. Tasks and zero-length events never
/// conflict; ranges are half-open, so back-to-back events do not either.
pub(crate) fn find_conflicts(occurrences: &[Occurrence]) -> Vec<ConflictMarker> {
    let mut conflicts = Vec::new();
    let mut active: Vec<&Occurrence> = Vec::new();

    for occ in occurrences
        .iter()
        .filter(|o| o.kind() == ItemKind::Event && o.occurrence_end > o.occurrence_start)
    {
        active.retain(|open| open.occurrence_end > occ.occurrence_start);

        for open in &active {
            conflicts.push(ConflictMarker {
                occurrence_id_a: open.id(),
                occurrence_id_b: occ.id(),
                overlap_start: occ.occurrence_start,
                overlap_end: open.occurrence_end.min(occ.occurrence_end),
            });
        }

        active.push(occ);
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::tests::make_test_item;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn occ(id: &str, start: DateTime<Utc>, minutes: i64) -> Occurrence {
        Occurrence::single(&make_test_item(id, start, minutes))
    }

    #[test]
    fn test_overlap_range() {
        let occs = vec![occ("a", at(10, 0), 60), occ("b", at(10, 30), 60)];
        let conflicts = find_conflicts(&occs);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].overlap_start, at(10, 30));
        assert_eq!(conflicts[0].overlap_end, at(11, 0));
        assert_eq!(conflicts[0].occurrence_id_a, occs[0].id());
    }

    #[test]
    fn test_back_to_back_is_not_a_conflict() {
        let occs = vec![occ("a", at(10, 0), 60), occ("b", at(11, 0), 60)];
        assert!(find_conflicts(&occs).is_empty());
    }

    #[test]
    fn test_contained_event_conflicts_with_every_open_one() {
        let occs = vec![
            occ("long", at(9, 0), 180),
            occ("mid", at(10, 0), 60),
            occ("short", at(10, 15), 15),
        ];
        let conflicts = find_conflicts(&occs);

        assert_eq!(conflicts.len(), 3);
        let last = &conflicts[2];
        assert_eq!(last.occurrence_id_a, occs[1].id());
        assert_eq!((last.overlap_start, last.overlap_end), (at(10, 15), at(10, 30)));
    }

    #[test]
    fn test_tasks_and_zero_length_events_are_ignored() {
        let mut task = occ("task", at(10, 30), 60);
        task.data.kind = ItemKind::Task;
        let occs = vec![
            occ("a", at(10, 0), 60),
            occ("instant", at(10, 15), 0),
            task,
        ];
        assert!(find_conflicts(&occs).is_empty());
    }
}
