//! Mapping store: the only durable state the core depends on.
//!
//! A record correlates one canonical occurrence identity to the destination
//! event mirroring it. The store also keeps small per-subscription state
//! values (last cycle outcome).

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MirrorResult;

/// Correlation between a source occurrence and its mirrored destination
/// event. Created on first successful mirror, updated on every subsequent
/// one, deleted when the occurrence goes stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub subscription_id: String,
    pub source_event_id: String,
    pub destination_event_id: String,
    /// Last-known destination change token, if the destination issues them.
    pub change_token: Option<String>,
    /// Fingerprint of the payload last written, used to skip no-op updates.
    #[serde(default)]
    pub content_hash: Option<String>,
    pub synced_at: DateTime<Utc>,
}

pub trait MappingStore {
    fn get(&self, subscription_id: &str, occurrence_id: &str)
    -> MirrorResult<Option<MappingRecord>>;
    fn list(&self, subscription_id: &str) -> MirrorResult<Vec<MappingRecord>>;
    fn upsert(&self, record: &MappingRecord) -> MirrorResult<()>;
    fn delete(&self, subscription_id: &str, occurrence_id: &str) -> MirrorResult<()>;

    /// Per-subscription state values, unrelated to occurrence mappings.
    fn get_state(&self, subscription_id: &str, key: &str) -> MirrorResult<Option<String>>;
    fn set_state(&self, subscription_id: &str, key: &str, value: &str) -> MirrorResult<()>;
}
