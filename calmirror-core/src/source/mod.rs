//! Event sources.
//!
//! Every source kind exposes the same capability surface: list the
//! canonical occurrences overlapping a window, and a health probe. Which
//! variant a subscription uses is a configuration-time choice.

pub mod api;
pub mod feed;

pub use api::ApiSource;
pub use feed::FeedSource;

use crate::error::MirrorResult;
use crate::occurrence::CanonicalOccurrence;
use crate::window::SyncWindow;

/// One window's worth of source data. `fetched` is the raw pre-filter
/// count (observability only), distinct from `occurrences.len()`.
#[derive(Debug, Default)]
pub struct SourceSnapshot {
    pub fetched: usize,
    pub occurrences: Vec<CanonicalOccurrence>,
}

pub trait EventSource {
    fn list_occurrences(
        &self,
        window: &SyncWindow,
    ) -> impl Future<Output = MirrorResult<SourceSnapshot>> + Send;

    fn health_check(&self) -> impl Future<Output = MirrorResult<()>> + Send;
}

/// A configured source, one variant per source kind.
pub enum Source {
    Feed(FeedSource),
    Api(ApiSource),
}

impl Source {
    /// Stable kind tag, recorded in destination metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Feed(_) => "feed",
            Source::Api(_) => "api",
        }
    }
}

impl EventSource for Source {
    async fn list_occurrences(&self, window: &SyncWindow) -> MirrorResult<SourceSnapshot> {
        match self {
            Source::Feed(source) => source.list_occurrences(window).await,
            Source::Api(source) => source.list_occurrences(window).await,
        }
    }

    async fn health_check(&self) -> MirrorResult<()> {
        match self {
            Source::Feed(source) => source.health_check().await,
            Source::Api(source) => source.health_check().await,
        }
    }
}
