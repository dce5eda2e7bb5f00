//! REST implementation of the destination calendar.
//!
//! Talks to a JSON calendar API: `POST /calendars/{id}/events`,
//! `PATCH /calendars/{id}/events/{eventId}`, `DELETE` on the same path.
//! HTTP statuses map onto the shared error taxonomy so the engine's
//! self-healing and retry behavior work unchanged.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::HTTP_TIMEOUT_SECS;
use crate::destination::{CalendarDestination, DestinationEvent, EventPayload};
use crate::error::{MirrorError, MirrorResult};
use crate::occurrence::OccurrenceTime;

pub struct RestDestination {
    client: reqwest::Client,
    base_url: String,
    calendar_id: String,
    bearer_token: Option<String>,
}

impl RestDestination {
    pub fn new(
        base_url: impl Into<String>,
        calendar_id: impl Into<String>,
        bearer_token: Option<String>,
    ) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(RestDestination {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            calendar_id: calendar_id.into(),
            bearer_token,
        })
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), event_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> MirrorResult<reqwest::Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        check_status(response).await
    }
}

impl CalendarDestination for RestDestination {
    async fn create_event(&self, payload: &EventPayload) -> MirrorResult<DestinationEvent> {
        let response = self
            .send(
                self.authorize(self.client.post(self.events_url()))
                    .json(&RestEventBody::from(payload)),
            )
            .await?;
        parse_event_response(response).await
    }

    async fn update_event(
        &self,
        destination_event_id: &str,
        payload: &EventPayload,
    ) -> MirrorResult<DestinationEvent> {
        let response = self
            .send(
                self.authorize(self.client.patch(self.event_url(destination_event_id)))
                    .json(&RestEventBody::from(payload)),
            )
            .await?;
        parse_event_response(response).await
    }

    async fn delete_event(&self, destination_event_id: &str) -> MirrorResult<()> {
        self.send(self.authorize(self.client.delete(self.event_url(destination_event_id))))
            .await?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestEventBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: RestTime,
    end: RestTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    reminder_lead_minutes: Option<i64>,
    private_metadata: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a EventPayload> for RestEventBody<'a> {
    fn from(payload: &'a EventPayload) -> Self {
        RestEventBody {
            title: &payload.title,
            description: payload.description.as_deref(),
            location: payload.location.as_deref(),
            start: RestTime::from(&payload.start),
            end: RestTime::from(&payload.end),
            reminder_lead_minutes: payload.reminder_lead_minutes,
            private_metadata: &payload.metadata,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RestTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl From<&OccurrenceTime> for RestTime {
    fn from(time: &OccurrenceTime) -> Self {
        match time {
            OccurrenceTime::Date(d) => RestTime {
                date: Some(d.format("%Y-%m-%d").to_string()),
                date_time: None,
                time_zone: None,
            },
            OccurrenceTime::Instant { utc, tzid } => RestTime {
                date: None,
                date_time: Some(utc.to_rfc3339()),
                time_zone: tzid.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestEventResponse {
    id: String,
    #[serde(default)]
    change_token: Option<String>,
}

async fn parse_event_response(response: reqwest::Response) -> MirrorResult<DestinationEvent> {
    let body: RestEventResponse = response
        .json()
        .await
        .map_err(|e| MirrorError::Server(format!("malformed destination response: {e}")))?;
    Ok(DestinationEvent {
        id: body.id,
        change_token: body.change_token,
    })
}

fn map_transport_error(err: reqwest::Error) -> MirrorError {
    if err.is_timeout() {
        MirrorError::Timeout(HTTP_TIMEOUT_SECS)
    } else {
        MirrorError::Server(format!("request failed: {err}"))
    }
}

/// Map an HTTP status into the error taxonomy. 404/410 must become
/// `NotFound` (self-heal on update, already-satisfied on delete) and 429
/// must carry the Retry-After hint.
async fn check_status(response: reqwest::Response) -> MirrorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    let url = response.url().to_string();
    let detail = response.text().await.unwrap_or_default();
    let message = format!("{status} from {url}: {}", detail.trim());

    Err(match status.as_u16() {
        404 | 410 => MirrorError::NotFound(message),
        401 | 403 => MirrorError::Auth(message),
        429 => MirrorError::RateLimited {
            message,
            retry_after,
        },
        500..=599 => MirrorError::Server(message),
        _ => MirrorError::Validation(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_rest_time_shapes() {
        let date = RestTime::from(&OccurrenceTime::Date(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        ));
        assert_eq!(date.date.as_deref(), Some("2026-03-01"));
        assert!(date.date_time.is_none());

        let zoned = RestTime::from(&OccurrenceTime::Instant {
            utc: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
            tzid: Some("America/Toronto".to_string()),
        });
        assert_eq!(zoned.date_time.as_deref(), Some("2026-03-01T15:00:00+00:00"));
        assert_eq!(zoned.time_zone.as_deref(), Some("America/Toronto"));
    }
}
