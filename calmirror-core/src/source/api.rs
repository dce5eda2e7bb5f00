//! Structured-API event source.
//!
//! Pulls already-expanded event instances from a JSON calendar API.
//! Series masters returned alongside their instances are filtered out so
//! a master is never mirrored in addition to the occurrences it
//! generated. Unlike feeds, API events can carry a reminder override.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::constants::{DEFAULT_TIMED_DURATION_MINS, HTTP_TIMEOUT_SECS};
use crate::error::{MirrorError, MirrorResult};
use crate::occurrence::{CanonicalOccurrence, OccurrenceTime};
use crate::source::feed::{classify_fetch_error, classify_status};
use crate::source::{EventSource, SourceSnapshot};
use crate::window::SyncWindow;

pub struct ApiSource {
    client: reqwest::Client,
    events_url: String,
    bearer_token: Option<String>,
}

impl ApiSource {
    pub fn new(events_url: impl Into<String>, bearer_token: Option<String>) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(ApiSource {
            client,
            events_url: events_url.into(),
            bearer_token,
        })
    }

    async fn fetch_events(&self, window: &SyncWindow) -> MirrorResult<Vec<ApiEvent>> {
        let mut request = self.client.get(&self.events_url).query(&[
            ("timeMin", window.start.to_rfc3339()),
            ("timeMax", window.end.to_rfc3339()),
            ("singleEvents", "true".to_string()),
        ]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_fetch_error)?;
        let response = classify_status(response)?;
        let listing: ApiEventListing = response
            .json()
            .await
            .map_err(|e| MirrorError::Source(format!("malformed event listing: {e}")))?;
        Ok(listing.events)
    }
}

impl EventSource for ApiSource {
    async fn list_occurrences(&self, window: &SyncWindow) -> MirrorResult<SourceSnapshot> {
        let events = self.fetch_events(window).await?;
        let fetched = events.len();

        let mut occurrences: Vec<CanonicalOccurrence> = events
            .into_iter()
            .filter(|e| e.recurrence.is_empty())
            .filter_map(into_occurrence)
            .filter(|o| o.overlaps(window))
            .collect();
        occurrences.sort_by(|a, b| {
            (a.start.to_utc(), &a.id).cmp(&(b.start.to_utc(), &b.id))
        });

        Ok(SourceSnapshot {
            fetched,
            occurrences,
        })
    }

    async fn health_check(&self) -> MirrorResult<()> {
        let mut request = self.client.get(&self.events_url).query(&[("maxResults", "1")]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(classify_fetch_error)?;
        classify_status(response)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiEventListing {
    #[serde(default)]
    events: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: String,
    #[serde(default)]
    series_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start: Option<ApiTime>,
    #[serde(default)]
    end: Option<ApiTime>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
    /// Recurrence rule lines; non-empty marks a series master.
    #[serde(default)]
    recurrence: Vec<String>,
    #[serde(default)]
    reminder_lead_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTime {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    time_zone: Option<String>,
}

impl ApiTime {
    fn into_occurrence_time(self) -> Option<OccurrenceTime> {
        if let Some(date) = self.date {
            return Some(OccurrenceTime::Date(date));
        }
        self.date_time.map(|utc| OccurrenceTime::Instant {
            utc,
            tzid: self.time_zone,
        })
    }
}

/// Map one API event into the canonical shape. Events without a usable
/// start are skipped, matching the parse-skip behavior of the feed path.
fn into_occurrence(event: ApiEvent) -> Option<CanonicalOccurrence> {
    let start = event.start?.into_occurrence_time()?;
    let is_all_day = start.is_date();

    let end = match event.end.and_then(ApiTime::into_occurrence_time) {
        Some(end) => end,
        None => default_end(&start)?,
    };
    if end.to_utc() <= start.to_utc() {
        return None;
    }

    let is_cancelled = event
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("cancelled"));

    Some(CanonicalOccurrence {
        id: event.id,
        series_id: event.series_id,
        title: event.title.unwrap_or_else(|| "(No title)".to_string()),
        description: event.description,
        location: event.location,
        start,
        end,
        is_all_day,
        is_cancelled,
        last_modified: event.updated,
        reminder_lead_minutes: event.reminder_lead_minutes,
    })
}

fn default_end(start: &OccurrenceTime) -> Option<OccurrenceTime> {
    match start {
        OccurrenceTime::Date(d) => d.checked_add_days(Days::new(1)).map(OccurrenceTime::Date),
        OccurrenceTime::Instant { utc, tzid } => Some(OccurrenceTime::Instant {
            utc: *utc + chrono::Duration::minutes(DEFAULT_TIMED_DURATION_MINS),
            tzid: tzid.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing(json: &str) -> Vec<ApiEvent> {
        serde_json::from_str::<ApiEventListing>(json).unwrap().events
    }

    #[test]
    fn test_masters_are_filtered_instances_kept() {
        let events = listing(
            r#"{"events":[
                {"id":"series-1","title":"Standup","start":{"dateTime":"2026-03-03T15:00:00Z"},
                 "end":{"dateTime":"2026-03-03T15:30:00Z"},"recurrence":["RRULE:FREQ=DAILY"]},
                {"id":"series-1::20260303T150000Z","seriesId":"series-1","title":"Standup",
                 "start":{"dateTime":"2026-03-03T15:00:00Z"},"end":{"dateTime":"2026-03-03T15:30:00Z"}}
            ]}"#,
        );
        assert_eq!(events.len(), 2);

        let instances: Vec<_> = events
            .into_iter()
            .filter(|e| e.recurrence.is_empty())
            .filter_map(into_occurrence)
            .collect();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "series-1::20260303T150000Z");
        assert_eq!(instances[0].series_id.as_deref(), Some("series-1"));
    }

    #[test]
    fn test_all_day_and_reminder_mapping() {
        let events = listing(
            r#"{"events":[
                {"id":"evt-1","title":"Holiday","start":{"date":"2026-03-01"},
                 "reminderLeadMinutes":30}
            ]}"#,
        );
        let occ = into_occurrence(events.into_iter().next().unwrap()).unwrap();
        assert!(occ.is_all_day);
        assert_eq!(occ.reminder_lead_minutes, Some(30));
        assert_eq!(
            occ.end,
            OccurrenceTime::Date(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
        );
    }

    #[test]
    fn test_missing_start_and_inverted_bounds_are_skipped() {
        let events = listing(
            r#"{"events":[
                {"id":"no-start","title":"Broken"},
                {"id":"inverted","start":{"dateTime":"2026-03-01T15:00:00Z"},
                 "end":{"dateTime":"2026-03-01T14:00:00Z"}}
            ]}"#,
        );
        assert!(events.into_iter().filter_map(into_occurrence).next().is_none());
    }

    #[test]
    fn test_cancelled_status_maps_through() {
        let events = listing(
            r#"{"events":[
                {"id":"evt-1","start":{"dateTime":"2026-03-01T15:00:00Z"},"status":"CANCELLED",
                 "updated":"2026-02-20T10:00:00Z"}
            ]}"#,
        );
        let occ = into_occurrence(events.into_iter().next().unwrap()).unwrap();
        assert!(occ.is_cancelled);
        assert_eq!(
            occ.last_modified,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 10, 0, 0).unwrap())
        );
        assert_eq!(occ.title, "(No title)");
    }
}
