//! Canonical occurrence types.
//!
//! Every source kind (feed pipeline or structured API) funnels into
//! [`CanonicalOccurrence`], and the reconciliation engine works exclusively
//! with it. These values live only for the duration of one cycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::window::SyncWindow;

/// Separator between a series identity and the occurrence token it anchors.
pub const IDENTITY_SEPARATOR: &str = "::";

/// Start or end of an occurrence: either a calendar date (all-day events)
/// or an absolute instant carrying the zone it should display in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccurrenceTime {
    Date(NaiveDate),
    Instant {
        utc: DateTime<Utc>,
        /// Canonical IANA zone id for display, `None` for UTC/floating values.
        tzid: Option<String>,
    },
}

impl OccurrenceTime {
    /// Absolute instant for comparisons; dates resolve to midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            OccurrenceTime::Date(d) => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            OccurrenceTime::Instant { utc, .. } => *utc,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, OccurrenceTime::Date(_))
    }

    /// Canonical token identifying this instant: a day string for all-day
    /// values, the full UTC instant otherwise. Used to key overrides and
    /// exclusions to generated instances.
    pub fn identity_token(&self) -> String {
        match self {
            OccurrenceTime::Date(d) => d.format("%Y%m%d").to_string(),
            OccurrenceTime::Instant { utc, .. } => utc.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }
}

/// One concrete event instance, standalone or generated from a recurring
/// master, in the single shape the reconciliation engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOccurrence {
    /// Stable within a sync window. Expanded recurrences use
    /// `seriesId::occurrenceToken`.
    pub id: String,
    /// Identity of the recurring definition that produced this, if any.
    pub series_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: OccurrenceTime,
    pub end: OccurrenceTime,
    pub is_all_day: bool,
    /// Cancelled occurrences are still emitted (reconciliation needs them to
    /// drive deletes) but excluded from the active set.
    pub is_cancelled: bool,
    /// Tie-breaker only.
    pub last_modified: Option<DateTime<Utc>>,
    pub reminder_lead_minutes: Option<i64>,
}

impl CanonicalOccurrence {
    /// Half-open overlap with the sync window.
    pub fn overlaps(&self, window: &SyncWindow) -> bool {
        window.overlaps(self.start.to_utc(), self.end.to_utc())
    }
}

/// Compose the identity of one occurrence of a series.
pub fn composite_id(series_id: &str, token: &str) -> String {
    format!("{series_id}{IDENTITY_SEPARATOR}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_identity_token_shapes() {
        let date = OccurrenceTime::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(date.identity_token(), "20260301");

        let timed = OccurrenceTime::Instant {
            utc: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
            tzid: Some("America/Toronto".to_string()),
        };
        assert_eq!(timed.identity_token(), "20260301T150000Z");
    }

    #[test]
    fn test_date_resolves_to_midnight_utc() {
        let date = OccurrenceTime::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            date.to_utc(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
