//! Feed-backed event source.
//!
//! Fetches the raw feed document over HTTP and runs it through the feed
//! pipeline (parse, build, expand) to produce canonical occurrences.

use std::time::Duration;

use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::{MirrorError, MirrorResult};
use crate::feed::normalize_feed;
use crate::source::{EventSource, SourceSnapshot};
use crate::timezone::TemporalResolver;
use crate::window::SyncWindow;

pub struct FeedSource {
    client: reqwest::Client,
    url: String,
    resolver: TemporalResolver,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(FeedSource {
            client,
            url: url.into(),
            resolver: TemporalResolver::new(),
        })
    }

    async fn fetch_raw(&self) -> MirrorResult<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(classify_fetch_error)?;
        let response = classify_status(response)?;
        response
            .text()
            .await
            .map_err(|e| MirrorError::Source(format!("failed to read feed body: {e}")))
    }
}

impl EventSource for FeedSource {
    async fn list_occurrences(&self, window: &SyncWindow) -> MirrorResult<SourceSnapshot> {
        let raw = self.fetch_raw().await?;
        let (fetched, occurrences) = normalize_feed(&raw, window, &self.resolver);
        Ok(SourceSnapshot {
            fetched,
            occurrences,
        })
    }

    async fn health_check(&self) -> MirrorResult<()> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(classify_fetch_error)?;
        classify_status(response)?;
        Ok(())
    }
}

pub(crate) fn classify_fetch_error(err: reqwest::Error) -> MirrorError {
    if err.is_timeout() {
        MirrorError::Timeout(HTTP_TIMEOUT_SECS)
    } else {
        MirrorError::Source(format!("request failed: {err}"))
    }
}

pub(crate) fn classify_status(response: reqwest::Response) -> MirrorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = format!("{status} from {}", response.url());
    Err(match status.as_u16() {
        401 | 403 => MirrorError::Auth(message),
        429 => MirrorError::RateLimited {
            message,
            retry_after: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        500..=599 => MirrorError::Server(message),
        _ => MirrorError::Source(message),
    })
}
