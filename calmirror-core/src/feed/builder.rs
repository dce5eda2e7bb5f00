//! Property block -> intermediate occurrence.
//!
//! Interprets the recognized properties of one VEVENT block. Anything
//! malformed enough to be unusable (missing identifier, unparseable start,
//! non-positive duration) drops the single block, never the whole feed.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::constants::DEFAULT_TIMED_DURATION_MINS;
use crate::feed::parser::{Property, PropertyBlock};
use crate::occurrence::{CanonicalOccurrence, OccurrenceTime, composite_id};
use crate::timezone::TemporalResolver;
use crate::window::SyncWindow;

/// One event definition with recurrence/override markers still attached.
/// Exists only while a feed is being normalized.
#[derive(Debug, Clone)]
pub struct IntermediateOccurrence {
    pub uid: String,
    /// Final identity: the uid, or `uid::anchor` for overrides and
    /// expanded instances.
    pub identity: String,
    pub series_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: OccurrenceTime,
    pub end: OccurrenceTime,
    pub is_all_day: bool,
    pub cancelled: bool,
    pub last_modified: Option<DateTime<Utc>>,
    /// Recurrence rule text; presence marks this block as a master.
    pub rrule: Option<String>,
    /// Identity tokens of excluded instances.
    pub exdate_tokens: HashSet<String>,
    /// Token of the series instant this block replaces, if it is an override.
    pub override_anchor: Option<String>,
}

impl IntermediateOccurrence {
    /// A master is a recurring definition that still needs expansion.
    /// Overrides are never treated as masters even if they carry rule text.
    pub fn is_master(&self) -> bool {
        self.rrule.is_some() && self.override_anchor.is_none()
    }

    pub fn overlaps(&self, window: &SyncWindow) -> bool {
        window.overlaps(self.start.to_utc(), self.end.to_utc())
    }

    pub fn into_canonical(self) -> CanonicalOccurrence {
        CanonicalOccurrence {
            id: self.identity,
            series_id: self.series_id,
            title: self.title,
            description: self.description,
            location: self.location,
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
            is_cancelled: self.cancelled,
            last_modified: self.last_modified,
            // The flat feed grammar carries no alarm blocks.
            reminder_lead_minutes: None,
        }
    }
}

/// Builds intermediate occurrences out of parsed property blocks.
pub struct OccurrenceBuilder<'a> {
    resolver: &'a TemporalResolver,
}

impl<'a> OccurrenceBuilder<'a> {
    pub fn new(resolver: &'a TemporalResolver) -> Self {
        OccurrenceBuilder { resolver }
    }

    /// Interpret one block. `None` means the block is skipped silently.
    pub fn build(&self, block: &PropertyBlock) -> Option<IntermediateOccurrence> {
        let uid = block.find("UID").map(|p| p.value.trim().to_string())?;
        if uid.is_empty() {
            return None;
        }

        let start = self.parse_time(block.find("DTSTART")?)?;
        let is_all_day = start.is_date();

        let end = match block.find("DTEND").and_then(|p| self.parse_time(p)) {
            Some(end) => end,
            // Implicit duration: a full day for all-day events, half an
            // hour for timed ones.
            None => match &start {
                OccurrenceTime::Date(d) => OccurrenceTime::Date(*d + Duration::days(1)),
                OccurrenceTime::Instant { utc, tzid } => OccurrenceTime::Instant {
                    utc: *utc + Duration::minutes(DEFAULT_TIMED_DURATION_MINS),
                    tzid: tzid.clone(),
                },
            },
        };

        if end.to_utc() <= start.to_utc() {
            return None;
        }

        let title = block
            .find("SUMMARY")
            .map(|p| unescape_text(&p.value))
            .unwrap_or_else(|| "(No title)".to_string());
        let description = block.find("DESCRIPTION").map(|p| unescape_text(&p.value));
        let location = block.find("LOCATION").map(|p| unescape_text(&p.value));

        let cancelled = block
            .find("STATUS")
            .is_some_and(|p| p.value.trim().eq_ignore_ascii_case("CANCELLED"));

        let last_modified = block
            .find("LAST-MODIFIED")
            .and_then(|p| self.parse_time(p))
            .map(|t| t.to_utc());

        let rrule = block.find("RRULE").map(|p| p.value.trim().to_string());

        let exdate_tokens: HashSet<String> = block
            .find_all("EXDATE")
            .flat_map(|p| self.parse_time_list(p))
            .map(|t| t.identity_token())
            .collect();

        // A RECURRENCE-ID marks this block as an override of one series
        // instance; its identity becomes series::anchor and it is excluded
        // from standalone/master treatment.
        let override_anchor = block
            .find("RECURRENCE-ID")
            .and_then(|p| self.parse_time(p))
            .map(|t| t.identity_token());

        let (identity, series_id) = match &override_anchor {
            Some(anchor) => (composite_id(&uid, anchor), Some(uid.clone())),
            None => (uid.clone(), None),
        };

        Some(IntermediateOccurrence {
            uid,
            identity,
            series_id,
            title,
            description,
            location,
            start,
            end,
            is_all_day,
            cancelled,
            last_modified,
            rrule,
            exdate_tokens,
            override_anchor,
        })
    }

    /// Parse a date/date-time property value into an occurrence time.
    ///
    /// 8-digit values (or VALUE=DATE) are calendar dates. A trailing `Z`
    /// bypasses zone resolution entirely; otherwise the TZID parameter, if
    /// any, qualifies the local wall clock.
    fn parse_time(&self, prop: &Property) -> Option<OccurrenceTime> {
        self.parse_time_value(prop.value.trim(), prop)
    }

    /// Multi-valued variant for exclusion lists.
    fn parse_time_list(&self, prop: &Property) -> Vec<OccurrenceTime> {
        prop.value
            .split(',')
            .filter_map(|v| self.parse_time_value(v.trim(), prop))
            .collect()
    }

    fn parse_time_value(&self, value: &str, prop: &Property) -> Option<OccurrenceTime> {
        let is_date = prop.param("VALUE") == Some("DATE")
            || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()));

        if is_date {
            let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
            return Some(OccurrenceTime::Date(date));
        }

        if let Some(stripped) = value.strip_suffix('Z') {
            let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
            return Some(OccurrenceTime::Instant {
                utc: naive.and_utc(),
                tzid: None,
            });
        }

        let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
        let tzid = prop.param("TZID");
        let utc = self.resolver.resolve_local(naive, tzid);
        Some(OccurrenceTime::Instant {
            utc,
            // Keep the display zone only when it resolved to a real zone.
            tzid: tzid.and_then(|z| self.resolver.canonical_zone_name(z)),
        })
    }
}

/// Reverse the feed's text escaping: `\n` -> newline, `\,` -> `,`,
/// `\;` -> `;`, `\\` -> `\`. Unrecognized escapes keep their backslash.
pub fn unescape_text(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(',') => result.push(','),
            Some(';') => result.push(';'),
            Some('\\') => result.push('\\'),
            Some('n') | Some('N') => result.push('\n'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}
