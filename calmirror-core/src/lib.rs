//! Core engine for calmirror: one-way mirroring of external calendar
//! sources into a destination calendar.
//!
//! The pipeline: a source produces [`occurrence::CanonicalOccurrence`]
//! values for a [`window::SyncWindow`] (feeds go through the `feed`
//! pipeline of parse, build, expand; structured APIs map natively), and
//! [`reconcile::ReconciliationEngine`] diffs them against the
//! [`store::MappingStore`] to drive idempotent create/update/delete calls
//! on the [`destination::CalendarDestination`].

pub mod config;
pub mod constants;
pub mod destination;
pub mod error;
pub mod feed;
pub mod occurrence;
pub mod reconcile;
pub mod retry;
pub mod source;
pub mod store;
pub mod timezone;
pub mod window;

pub use config::{MirrorConfig, SourceConfig, SubscriptionConfig};
pub use error::{MirrorError, MirrorResult};
pub use occurrence::{CanonicalOccurrence, OccurrenceTime};
pub use reconcile::{CycleStats, ReconciliationEngine};
pub use source::{EventSource, Source, SourceSnapshot};
pub use store::{JsonFileStore, MappingRecord, MappingStore, MemoryStore};
pub use window::SyncWindow;
