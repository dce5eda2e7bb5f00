//! Feed normalization pipeline: raw text -> canonical occurrences.
//!
//! `parse` -> `build` -> `expand`, then override matching, deduplication,
//! and deterministic ordering.

pub mod builder;
pub mod expand;
pub mod parser;

use std::collections::HashMap;

pub use builder::{IntermediateOccurrence, OccurrenceBuilder};
pub use expand::RecurrenceExpander;
pub use parser::{Property, PropertyBlock};

use crate::occurrence::CanonicalOccurrence;
use crate::timezone::TemporalResolver;
use crate::window::SyncWindow;

/// Normalize a raw feed into the canonical occurrences overlapping the
/// window. Returns the raw block count alongside (observability only; it
/// counts pre-filter definitions, not in-window occurrences).
pub fn normalize_feed(
    raw: &str,
    window: &SyncWindow,
    resolver: &TemporalResolver,
) -> (usize, Vec<CanonicalOccurrence>) {
    let blocks = parser::parse(raw);
    let fetched = blocks.len();

    let builder = OccurrenceBuilder::new(resolver);
    let occurrences: Vec<IntermediateOccurrence> =
        blocks.iter().filter_map(|b| builder.build(b)).collect();

    let mut masters: Vec<IntermediateOccurrence> = Vec::new();
    let mut singles: Vec<IntermediateOccurrence> = Vec::new();
    let mut overrides_by_series: HashMap<String, HashMap<String, IntermediateOccurrence>> =
        HashMap::new();

    for occ in occurrences {
        if let Some(anchor) = occ.override_anchor.clone() {
            overrides_by_series
                .entry(occ.uid.clone())
                .or_default()
                .insert(anchor, occ);
        } else if occ.is_master() {
            masters.push(occ);
        } else {
            singles.push(occ);
        }
    }

    let expander = RecurrenceExpander::new(resolver);
    let mut emitted: Vec<IntermediateOccurrence> = Vec::new();

    for master in &masters {
        let overrides = overrides_by_series.remove(&master.uid).unwrap_or_default();
        emitted.extend(expander.expand(master, overrides, window));
    }

    emitted.extend(singles.into_iter().filter(|o| o.overlaps(window)));

    // Overrides whose series has no master at all still stand on their own.
    let mut orphan_series: Vec<_> = overrides_by_series.into_iter().collect();
    orphan_series.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (_, group) in orphan_series {
        let mut group: Vec<_> = group.into_values().collect();
        group.sort_by(|a, b| a.identity.cmp(&b.identity));
        emitted.extend(group.into_iter().filter(|o| o.overlaps(window)));
    }

    let deduped = dedup_by_identity(emitted);

    let mut canonical: Vec<CanonicalOccurrence> = deduped
        .into_iter()
        .map(IntermediateOccurrence::into_canonical)
        .collect();
    canonical.sort_by(|a, b| {
        (a.start.to_utc(), a.id.as_str()).cmp(&(b.start.to_utc(), b.id.as_str()))
    });

    (fetched, canonical)
}

/// When two records share a final identity, keep the one with the later
/// last-modified timestamp; ties keep the earlier-emitted record.
fn dedup_by_identity(occurrences: Vec<IntermediateOccurrence>) -> Vec<IntermediateOccurrence> {
    let mut by_identity: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Option<IntermediateOccurrence>> = Vec::new();

    for occ in occurrences {
        match by_identity.get(&occ.identity) {
            Some(&idx) => {
                let existing = kept[idx].as_ref().unwrap();
                if occ.last_modified > existing.last_modified {
                    kept[idx] = Some(occ);
                }
            }
            None => {
                by_identity.insert(occ.identity.clone(), kept.len());
                kept.push(Some(occ));
            }
        }
    }

    kept.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> SyncWindow {
        SyncWindow::from_bounds(
            Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_simple_feed_event_normalizes() {
        let raw = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:evt-1\r\n\
DTSTART:20260301T150000Z\r\n\
DTEND:20260301T153000Z\r\n\
SUMMARY:Team\\, Sync\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let resolver = TemporalResolver::new();
        let (fetched, occs) = normalize_feed(raw, &window(), &resolver);

        assert_eq!(fetched, 1);
        assert_eq!(occs.len(), 1);
        assert_eq!(occs[0].id, "evt-1");
        assert_eq!(occs[0].title, "Team, Sync");
        assert_eq!(
            occs[0].start.to_utc(),
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_round_trips_absolute_instant() {
        let raw = "BEGIN:VEVENT\n\
UID:evt-1\n\
DTSTART:20261107T093000Z\n\
DTEND:20261107T101500Z\n\
END:VEVENT\n";

        let resolver = TemporalResolver::new();
        let win = SyncWindow::from_bounds(
            Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let (_, occs) = normalize_feed(raw, &win, &resolver);

        // Reserializing through the identity token yields the same instant.
        assert_eq!(occs[0].start.identity_token(), "20261107T093000Z");
        assert_eq!(occs[0].end.identity_token(), "20261107T101500Z");
    }

    #[test]
    fn test_out_of_window_event_is_filtered() {
        let raw = "BEGIN:VEVENT\n\
UID:evt-1\n\
DTSTART:20260401T150000Z\n\
DTEND:20260401T153000Z\n\
END:VEVENT\n";

        let resolver = TemporalResolver::new();
        let (fetched, occs) = normalize_feed(raw, &window(), &resolver);
        assert_eq!(fetched, 1);
        assert!(occs.is_empty());
    }

    #[test]
    fn test_cancelled_event_still_emitted() {
        let raw = "BEGIN:VEVENT\n\
UID:evt-1\n\
DTSTART:20260301T150000Z\n\
DTEND:20260301T153000Z\n\
STATUS:CANCELLED\n\
END:VEVENT\n";

        let resolver = TemporalResolver::new();
        let (_, occs) = normalize_feed(raw, &window(), &resolver);
        assert_eq!(occs.len(), 1);
        assert!(occs[0].is_cancelled);
    }

    #[test]
    fn test_duplicate_identity_keeps_later_modified() {
        let raw = "BEGIN:VEVENT\n\
UID:evt-1\n\
DTSTART:20260301T150000Z\n\
DTEND:20260301T153000Z\n\
SUMMARY:Old title\n\
LAST-MODIFIED:20260210T000000Z\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
UID:evt-1\n\
DTSTART:20260301T150000Z\n\
DTEND:20260301T153000Z\n\
SUMMARY:New title\n\
LAST-MODIFIED:20260220T000000Z\n\
END:VEVENT\n";

        let resolver = TemporalResolver::new();
        let (fetched, occs) = normalize_feed(raw, &window(), &resolver);
        assert_eq!(fetched, 2);
        assert_eq!(occs.len(), 1);
        assert_eq!(occs[0].title, "New title");
    }

    #[test]
    fn test_output_ordered_by_start_then_identity() {
        let raw = "BEGIN:VEVENT\n\
UID:late\n\
DTSTART:20260302T100000Z\n\
DTEND:20260302T110000Z\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
UID:b-event\n\
DTSTART:20260301T100000Z\n\
DTEND:20260301T110000Z\n\
END:VEVENT\n\
BEGIN:VEVENT\n\
UID:a-event\n\
DTSTART:20260301T100000Z\n\
DTEND:20260301T110000Z\n\
END:VEVENT\n";

        let resolver = TemporalResolver::new();
        let (_, occs) = normalize_feed(raw, &window(), &resolver);
        let ids: Vec<&str> = occs.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a-event", "b-event", "late"]);
    }
}
