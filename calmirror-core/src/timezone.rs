//! Timezone resolution and local-time anchoring.
//!
//! Feed sources qualify local times with arbitrary zone identifiers,
//! including legacy Windows-style display names and vendor-prefixed paths.
//! The resolver maps those to canonical IANA zones, converts wall-clock
//! values to absolute instants (DST-correct), and back.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Zone lookups are repeated for every property of every event in a feed;
/// results are memoized up to this many distinct names.
const ZONE_CACHE_CAP: usize = 256;

/// Iterations of the wall-clock -> instant convergence loop. Offsets do not
/// oscillate faster than this.
const OFFSET_CONVERGENCE_ITERS: usize = 4;

/// Legacy Windows display names mapped to IANA zone ids. Covers the names
/// that commonly show up in exported feeds; anything else falls through to
/// substring matching.
const WINDOWS_ZONE_ALIASES: &[(&str, &str)] = &[
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("Romance Standard Time", "Europe/Paris"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("India Standard Time", "Asia/Kolkata"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    ("UTC", "UTC"),
];

/// Resolves feed-local time expressions to absolute instants and back.
/// Owns its own bounded lookup cache; lifetime is tied to the process,
/// not reached through globals.
pub struct TemporalResolver {
    zone_cache: Mutex<HashMap<String, Option<Tz>>>,
}

impl Default for TemporalResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalResolver {
    pub fn new() -> Self {
        TemporalResolver {
            zone_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Map an external zone identifier to a canonical IANA zone.
    ///
    /// Tries, in order: direct IANA parse, the Windows alias table, and
    /// degrading a `/vendor/version/Region/City` path to its trailing
    /// segments. `None` means the value should be treated as zone-less.
    pub fn resolve_zone(&self, name: &str) -> Option<Tz> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(cached) = self.zone_cache.lock().unwrap().get(name) {
            return *cached;
        }

        let resolved = Self::lookup_zone(name);

        let mut cache = self.zone_cache.lock().unwrap();
        if cache.len() >= ZONE_CACHE_CAP {
            cache.clear();
        }
        cache.insert(name.to_string(), resolved);

        resolved
    }

    fn lookup_zone(name: &str) -> Option<Tz> {
        if let Ok(tz) = name.parse::<Tz>() {
            return Some(tz);
        }

        if let Some((_, iana)) = WINDOWS_ZONE_ALIASES.iter().find(|(alias, _)| *alias == name) {
            return iana.parse().ok();
        }

        // "/freeassociation.sourceforge.net/Tzfile/Europe/Paris" degrades to
        // "Europe/Paris", then to "Paris"-style single segments.
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() >= 2 {
            let tail_two = format!("{}/{}", segments[segments.len() - 2], segments[segments.len() - 1]);
            if let Ok(tz) = tail_two.parse::<Tz>() {
                return Some(tz);
            }
        }
        if let Some(last) = segments.last() {
            if let Ok(tz) = last.parse::<Tz>() {
                return Some(tz);
            }
        }

        None
    }

    /// Canonical IANA name for an external zone identifier, if resolvable.
    pub fn canonical_zone_name(&self, name: &str) -> Option<String> {
        self.resolve_zone(name).map(|tz| tz.name().to_string())
    }

    /// Resolve a feed-local wall-clock value to an absolute instant.
    ///
    /// `zone = None` (or an unresolvable name) treats the value as zone-less
    /// local time pinned to UTC. Values with an explicit UTC marker never
    /// reach this path with a zone.
    pub fn resolve_local(&self, local: NaiveDateTime, zone: Option<&str>) -> DateTime<Utc> {
        match zone.and_then(|z| self.resolve_zone(z)) {
            Some(tz) => self.anchor_in_zone(local, tz),
            None => local.and_utc(),
        }
    }

    /// Anchor a wall-clock value in a zone, DST-correct.
    ///
    /// Unambiguous and ambiguous (fall-back) times come straight from the
    /// zone database, taking the earlier of two ambiguous mappings. Times in
    /// a DST gap have no mapping, so the instant is found by offset
    /// convergence: guess assuming a fixed offset, recompute the offset at
    /// the guess, repeat until stable.
    fn anchor_in_zone(&self, local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let mut guess = local.and_utc();
                for _ in 0..OFFSET_CONVERGENCE_ITERS {
                    let offset_secs = tz
                        .offset_from_utc_datetime(&guess.naive_utc())
                        .fix()
                        .local_minus_utc() as i64;
                    let next = (local - Duration::seconds(offset_secs)).and_utc();
                    if next == guess {
                        break;
                    }
                    guess = next;
                }
                guess
            }
        }
    }

    /// UTC offset of a zone at a given instant.
    pub fn zone_offset_at(&self, zone: &str, instant: DateTime<Utc>) -> Option<Duration> {
        let tz = self.resolve_zone(zone)?;
        let secs = tz
            .offset_from_utc_datetime(&instant.naive_utc())
            .fix()
            .local_minus_utc() as i64;
        Some(Duration::seconds(secs))
    }

    /// Wall-clock fields of an instant as seen in a zone.
    pub fn wall_clock_at(&self, instant: DateTime<Utc>, zone: &str) -> Option<NaiveDateTime> {
        let tz = self.resolve_zone(zone)?;
        Some(instant.with_timezone(&tz).naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_direct_iana_name() {
        let resolver = TemporalResolver::new();
        assert_eq!(
            resolver.canonical_zone_name("America/Toronto").as_deref(),
            Some("America/Toronto")
        );
    }

    #[test]
    fn test_windows_alias_maps_to_iana() {
        let resolver = TemporalResolver::new();
        assert_eq!(
            resolver.canonical_zone_name("Eastern Standard Time").as_deref(),
            Some("America/New_York")
        );
        assert_eq!(
            resolver.canonical_zone_name("W. Europe Standard Time").as_deref(),
            Some("Europe/Berlin")
        );
    }

    #[test]
    fn test_vendor_path_degrades_to_region_city() {
        let resolver = TemporalResolver::new();
        assert_eq!(
            resolver
                .canonical_zone_name("/freeassociation.sourceforge.net/Tzfile/Europe/Paris")
                .as_deref(),
            Some("Europe/Paris")
        );
    }

    #[test]
    fn test_unknown_zone_falls_back_to_zoneless() {
        let resolver = TemporalResolver::new();
        assert!(resolver.resolve_zone("Not/A/Real/Zone/Name-At-All").is_none());

        // Unresolvable zone: wall clock is pinned to UTC
        let local = naive(2026, 3, 1, 15, 0);
        assert_eq!(
            resolver.resolve_local(local, Some("Not-A-Zone")),
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_local_respects_dst_offsets() {
        let resolver = TemporalResolver::new();

        // Winter: Toronto is UTC-5
        let winter = resolver.resolve_local(naive(2026, 1, 13, 11, 30), Some("America/Toronto"));
        assert_eq!(winter, Utc.with_ymd_and_hms(2026, 1, 13, 16, 30, 0).unwrap());

        // Summer: Toronto is UTC-4
        let summer = resolver.resolve_local(naive(2026, 6, 16, 11, 30), Some("America/Toronto"));
        assert_eq!(summer, Utc.with_ymd_and_hms(2026, 6, 16, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_dst_gap_converges_to_valid_instant() {
        let resolver = TemporalResolver::new();

        // 2026-03-08 02:30 does not exist in America/New_York (spring-forward
        // gap). Convergence must still land on a stable instant near the gap.
        let instant = resolver.resolve_local(naive(2026, 3, 8, 2, 30), Some("America/New_York"));
        let lower = Utc.with_ymd_and_hms(2026, 3, 8, 6, 30, 0).unwrap();
        let upper = Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).unwrap();
        assert!(instant >= lower && instant <= upper, "got {instant}");
    }

    #[test]
    fn test_zone_offset_changes_across_transition() {
        let resolver = TemporalResolver::new();
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();

        assert_eq!(
            resolver.zone_offset_at("America/Toronto", before),
            Some(Duration::hours(-5))
        );
        assert_eq!(
            resolver.zone_offset_at("America/Toronto", after),
            Some(Duration::hours(-4))
        );
    }

    #[test]
    fn test_wall_clock_round_trip() {
        let resolver = TemporalResolver::new();
        let local = naive(2026, 6, 16, 11, 30);
        let instant = resolver.resolve_local(local, Some("Europe/Paris"));
        assert_eq!(
            resolver.wall_clock_at(instant, "Europe/Paris"),
            Some(local)
        );
    }
}
