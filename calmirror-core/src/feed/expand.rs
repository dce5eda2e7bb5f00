//! Recurrence expansion.
//!
//! Expands a recurring master into concrete occurrences inside a sync
//! window, applying exclusions and per-instance overrides.
//!
//! Zone-qualified recurrences expand in local wall-clock time: the rule
//! engine is driven with a floating rendition of the master's wall clock,
//! and each generated floating instant is re-anchored to an absolute
//! instant through the resolver. That keeps "every Tuesday at 11:30 local"
//! at 11:30 local across a DST transition instead of drifting by the DST
//! delta. Replacement rule engines must preserve this ordering.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rrule::RRuleSet;

use crate::feed::builder::IntermediateOccurrence;
use crate::occurrence::{OccurrenceTime, composite_id};
use crate::timezone::TemporalResolver;
use crate::window::SyncWindow;

/// Hard ceiling on generated instances per master per window.
const MAX_INSTANCES: u16 = 1000;

/// Margin added to the floating-domain search bounds. The floating wall
/// clock is skewed from UTC by at most a zone offset, well under a day.
const FLOATING_MARGIN_DAYS: i64 = 1;

pub struct RecurrenceExpander<'a> {
    resolver: &'a TemporalResolver,
}

impl<'a> RecurrenceExpander<'a> {
    pub fn new(resolver: &'a TemporalResolver) -> Self {
        RecurrenceExpander { resolver }
    }

    /// Expand `master` over the window. `overrides` maps anchor tokens to
    /// the override blocks of this series; matched overrides replace their
    /// instance (or suppress it when they fall outside the window), and
    /// unmatched ones are still emitted standalone if in-window.
    pub fn expand(
        &self,
        master: &IntermediateOccurrence,
        mut overrides: HashMap<String, IntermediateOccurrence>,
        window: &SyncWindow,
    ) -> Vec<IntermediateOccurrence> {
        let mut instances = Vec::new();

        for wall in self.candidate_starts(master, window) {
            self.emit_candidate(master, wall, &mut overrides, window, &mut instances);
        }

        // Overrides whose anchor the rule no longer generates.
        let mut orphans: Vec<IntermediateOccurrence> = overrides.into_values().collect();
        orphans.sort_by(|a, b| a.identity.cmp(&b.identity));
        for orphan in orphans {
            if orphan.overlaps(window) {
                instances.push(orphan);
            }
        }

        instances
    }

    /// Floating wall-clock starts generated by the rule over the widened
    /// search range `[window.start - duration, window.end)`. The lower bound
    /// is widened by the master's duration so an occurrence beginning before
    /// the window but overlapping into it is not missed.
    fn candidate_starts(
        &self,
        master: &IntermediateOccurrence,
        window: &SyncWindow,
    ) -> Vec<NaiveDateTime> {
        let duration = master.end.to_utc() - master.start.to_utc();
        let wall_start = self.wall_clock_start(master);

        let rule_text = master.rrule.as_deref().unwrap_or_default();
        let rrule_input = format!(
            "DTSTART:{}Z\nRRULE:{}",
            wall_start.format("%Y%m%dT%H%M%S"),
            self.sanitize_rule(rule_text, master),
        );

        let rrule_set: RRuleSet = match rrule_input.parse() {
            Ok(set) => set,
            Err(e) => {
                // Degrade to the master's own start rather than dropping the
                // series, and say so: every other instance is lost this cycle.
                log::warn!(
                    "unparseable recurrence rule for '{}' ({e}); emitting only the master occurrence",
                    master.uid
                );
                return vec![wall_start];
            }
        };

        let margin = Duration::days(FLOATING_MARGIN_DAYS);
        let after = (window.start - duration - margin).with_timezone(&rrule::Tz::UTC);
        let before = (window.end + margin).with_timezone(&rrule::Tz::UTC);

        let result = rrule_set.after(after).before(before).all(MAX_INSTANCES);
        if result.limited {
            log::warn!(
                "recurrence expansion for '{}' truncated at {MAX_INSTANCES} instances",
                master.uid
            );
        }

        result.dates.iter().map(|dt| dt.naive_utc()).collect()
    }

    /// Re-anchor one floating candidate, apply exclusions and overrides,
    /// and emit whatever survives the window filter.
    fn emit_candidate(
        &self,
        master: &IntermediateOccurrence,
        wall: NaiveDateTime,
        overrides: &mut HashMap<String, IntermediateOccurrence>,
        window: &SyncWindow,
        out: &mut Vec<IntermediateOccurrence>,
    ) {
        let (start, end) = self.anchor(master, wall);
        let token = start.identity_token();

        if master.exdate_tokens.contains(&token) {
            return;
        }

        if let Some(replacement) = overrides.remove(&token) {
            // An override moving the instance outside the window cancels it
            // from this cycle's perspective.
            if replacement.overlaps(window) {
                out.push(replacement);
            }
            return;
        }

        if !window.overlaps(start.to_utc(), end.to_utc()) {
            return;
        }

        out.push(IntermediateOccurrence {
            uid: master.uid.clone(),
            identity: composite_id(&master.uid, &token),
            series_id: Some(master.uid.clone()),
            title: master.title.clone(),
            description: master.description.clone(),
            location: master.location.clone(),
            start,
            end,
            is_all_day: master.is_all_day,
            cancelled: master.cancelled,
            last_modified: master.last_modified,
            rrule: None,
            exdate_tokens: Default::default(),
            override_anchor: None,
        });
    }

    /// The master's start as a floating wall clock, the representation the
    /// rule engine is driven with.
    fn wall_clock_start(&self, master: &IntermediateOccurrence) -> NaiveDateTime {
        match &master.start {
            OccurrenceTime::Date(d) => d.and_hms_opt(0, 0, 0).unwrap(),
            OccurrenceTime::Instant { utc, tzid: Some(z) } => self
                .resolver
                .wall_clock_at(*utc, z)
                .unwrap_or_else(|| utc.naive_utc()),
            OccurrenceTime::Instant { utc, tzid: None } => utc.naive_utc(),
        }
    }

    /// Convert one generated floating start back into absolute bounds,
    /// inheriting the master's shape (date vs. zoned instant) and duration.
    fn anchor(
        &self,
        master: &IntermediateOccurrence,
        wall: NaiveDateTime,
    ) -> (OccurrenceTime, OccurrenceTime) {
        match (&master.start, &master.end) {
            (OccurrenceTime::Date(d_start), OccurrenceTime::Date(d_end)) => {
                let days = (*d_end - *d_start).num_days();
                let date = wall.date();
                (
                    OccurrenceTime::Date(date),
                    OccurrenceTime::Date(date + Duration::days(days)),
                )
            }
            (OccurrenceTime::Instant { tzid, .. }, _) => {
                let duration = master.end.to_utc() - master.start.to_utc();
                let utc = self.resolver.resolve_local(wall, tzid.as_deref());
                (
                    OccurrenceTime::Instant {
                        utc,
                        tzid: tzid.clone(),
                    },
                    OccurrenceTime::Instant {
                        utc: utc + duration,
                        tzid: tzid.clone(),
                    },
                )
            }
            // Date start with instant end does not occur in practice; fall
            // back to instant arithmetic.
            (OccurrenceTime::Date(_), _) => {
                let duration = master.end.to_utc() - master.start.to_utc();
                let utc = wall.and_utc();
                (
                    OccurrenceTime::Instant { utc, tzid: None },
                    OccurrenceTime::Instant {
                        utc: utc + duration,
                        tzid: None,
                    },
                )
            }
        }
    }

    /// Normalize rule text for the rule engine.
    ///
    /// Strips a redundant `RRULE:` prefix, and rewrites UNTIL so it matches
    /// the floating UTC-marked DTSTART the engine is driven with: date-only
    /// UNTIL becomes end-of-day, and an absolute (Z-marked) UNTIL on a
    /// zone-qualified master is re-expressed in the master's wall clock.
    fn sanitize_rule(&self, rule: &str, master: &IntermediateOccurrence) -> String {
        let rule = rule.trim();
        let rule = if rule.len() >= 6 && rule[..6].eq_ignore_ascii_case("RRULE:") {
            &rule[6..]
        } else {
            rule
        };

        rule.split(';')
            .map(|part| match part.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                    format!("UNTIL={}", self.normalize_until(value, master))
                }
                _ => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    fn normalize_until(&self, value: &str, master: &IntermediateOccurrence) -> String {
        let value = value.trim();

        if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
            return format!("{value}T235959Z");
        }

        if let Some(stripped) = value.strip_suffix('Z') {
            if let (
                Ok(naive),
                OccurrenceTime::Instant { tzid: Some(z), .. },
            ) = (
                NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S"),
                &master.start,
            ) {
                let instant: DateTime<Utc> = naive.and_utc();
                if let Some(wall) = self.resolver.wall_clock_at(instant, z) {
                    return format!("{}Z", wall.format("%Y%m%dT%H%M%S"));
                }
            }
            return value.to_string();
        }

        // Floating UNTIL must carry the same UTC marker as our DTSTART.
        format!("{value}Z")
    }
}
