//! Destination calendar interface.
//!
//! The reconciliation engine drives create/update/delete mutations against
//! this trait. Every payload carries an opaque private-metadata map with an
//! application marker and the canonical identity, so app-managed objects in
//! the destination can later be told apart from user-authored ones.

pub mod rest;

use std::collections::BTreeMap;

pub use rest::RestDestination;

use crate::constants::APP_MARKER;
use crate::error::MirrorResult;
use crate::occurrence::{CanonicalOccurrence, OccurrenceTime};

/// Metadata keys written on every destination object.
pub const META_APP_KEY: &str = "app";
pub const META_SOURCE_KIND_KEY: &str = "sourceKind";
pub const META_SUBSCRIPTION_KEY: &str = "subscriptionId";
pub const META_OCCURRENCE_KEY: &str = "occurrenceId";

/// The mutation payload for one destination event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventPayload {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: OccurrenceTime,
    pub end: OccurrenceTime,
    /// Reminder lead time in minutes; `None` means use the destination's
    /// default reminders.
    pub reminder_lead_minutes: Option<i64>,
    /// Opaque private metadata; the sole mechanism for identifying
    /// app-managed destination objects.
    pub metadata: BTreeMap<String, String>,
}

impl EventPayload {
    /// Build the payload mirroring one canonical occurrence, stamped with
    /// the idempotency metadata for its subscription.
    pub fn from_occurrence(
        occurrence: &CanonicalOccurrence,
        subscription_id: &str,
        source_kind: &str,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_APP_KEY.to_string(), APP_MARKER.to_string());
        metadata.insert(META_SOURCE_KIND_KEY.to_string(), source_kind.to_string());
        metadata.insert(
            META_SUBSCRIPTION_KEY.to_string(),
            subscription_id.to_string(),
        );
        metadata.insert(META_OCCURRENCE_KEY.to_string(), occurrence.id.clone());

        EventPayload {
            title: occurrence.title.clone(),
            description: occurrence.description.clone(),
            location: occurrence.location.clone(),
            start: occurrence.start.clone(),
            end: occurrence.end.clone(),
            reminder_lead_minutes: occurrence.reminder_lead_minutes,
            metadata,
        }
    }

    /// Content fingerprint, stored on the mapping record so an unchanged
    /// occurrence can skip its destination update entirely.
    pub fn fingerprint(&self) -> String {
        use std::hash::{DefaultHasher, Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// A successfully written destination event.
#[derive(Debug, Clone)]
pub struct DestinationEvent {
    pub id: String,
    pub change_token: Option<String>,
}

/// Capability interface of the destination calendar.
///
/// Implementations map their transport errors into the shared taxonomy:
/// not-found must surface as `MirrorError::NotFound` so the engine can
/// self-heal, and rate limits as `MirrorError::RateLimited` so retries
/// honor the server's hint.
pub trait CalendarDestination {
    fn create_event(
        &self,
        payload: &EventPayload,
    ) -> impl Future<Output = MirrorResult<DestinationEvent>> + Send;

    fn update_event(
        &self,
        destination_event_id: &str,
        payload: &EventPayload,
    ) -> impl Future<Output = MirrorResult<DestinationEvent>> + Send;

    fn delete_event(
        &self,
        destination_event_id: &str,
    ) -> impl Future<Output = MirrorResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payload_carries_idempotency_metadata() {
        let occ = CanonicalOccurrence {
            id: "series-1::20260303T150000Z".to_string(),
            series_id: Some("series-1".to_string()),
            title: "Standup".to_string(),
            description: None,
            location: None,
            start: OccurrenceTime::Instant {
                utc: Utc.with_ymd_and_hms(2026, 3, 3, 15, 0, 0).unwrap(),
                tzid: None,
            },
            end: OccurrenceTime::Instant {
                utc: Utc.with_ymd_and_hms(2026, 3, 3, 15, 30, 0).unwrap(),
                tzid: None,
            },
            is_all_day: false,
            is_cancelled: false,
            last_modified: None,
            reminder_lead_minutes: Some(10),
        };

        let payload = EventPayload::from_occurrence(&occ, "sub-1", "feed");
        assert_eq!(payload.metadata.get(META_APP_KEY).unwrap(), APP_MARKER);
        assert_eq!(payload.metadata.get(META_SOURCE_KIND_KEY).unwrap(), "feed");
        assert_eq!(payload.metadata.get(META_SUBSCRIPTION_KEY).unwrap(), "sub-1");
        assert_eq!(
            payload.metadata.get(META_OCCURRENCE_KEY).unwrap(),
            "series-1::20260303T150000Z"
        );
        assert_eq!(payload.reminder_lead_minutes, Some(10));
    }
}
