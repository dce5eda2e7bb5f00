//! JSON-file-backed mapping store.
//!
//! One directory per subscription under the store root, holding
//! `mappings.json` (occurrence id -> record) and `state.json`. Writes go
//! through a temp file and rename so a crash never leaves a torn document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MirrorError, MirrorResult};
use crate::store::{MappingRecord, MappingStore};

const MAPPINGS_FILE: &str = "mappings.json";
const STATE_FILE: &str = "state.json";

pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileStore { root: root.into() }
    }

    fn subscription_dir(&self, subscription_id: &str) -> PathBuf {
        self.root.join(subscription_id)
    }

    fn read_mappings(&self, subscription_id: &str) -> MirrorResult<BTreeMap<String, MappingRecord>> {
        read_json(&self.subscription_dir(subscription_id).join(MAPPINGS_FILE))
    }

    fn write_mappings(
        &self,
        subscription_id: &str,
        mappings: &BTreeMap<String, MappingRecord>,
    ) -> MirrorResult<()> {
        write_json(
            &self.subscription_dir(subscription_id),
            MAPPINGS_FILE,
            mappings,
        )
    }
}

impl MappingStore for JsonFileStore {
    fn get(
        &self,
        subscription_id: &str,
        occurrence_id: &str,
    ) -> MirrorResult<Option<MappingRecord>> {
        Ok(self.read_mappings(subscription_id)?.remove(occurrence_id))
    }

    fn list(&self, subscription_id: &str) -> MirrorResult<Vec<MappingRecord>> {
        Ok(self.read_mappings(subscription_id)?.into_values().collect())
    }

    fn upsert(&self, record: &MappingRecord) -> MirrorResult<()> {
        let mut mappings = self.read_mappings(&record.subscription_id)?;
        mappings.insert(record.source_event_id.clone(), record.clone());
        self.write_mappings(&record.subscription_id, &mappings)
    }

    fn delete(&self, subscription_id: &str, occurrence_id: &str) -> MirrorResult<()> {
        let mut mappings = self.read_mappings(subscription_id)?;
        if mappings.remove(occurrence_id).is_some() {
            self.write_mappings(subscription_id, &mappings)?;
        }
        Ok(())
    }

    fn get_state(&self, subscription_id: &str, key: &str) -> MirrorResult<Option<String>> {
        let state: BTreeMap<String, String> =
            read_json(&self.subscription_dir(subscription_id).join(STATE_FILE))?;
        Ok(state.get(key).cloned())
    }

    fn set_state(&self, subscription_id: &str, key: &str, value: &str) -> MirrorResult<()> {
        let dir = self.subscription_dir(subscription_id);
        let mut state: BTreeMap<String, String> = read_json(&dir.join(STATE_FILE))?;
        state.insert(key.to_string(), value.to_string());
        write_json(&dir, STATE_FILE, &state)
    }
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> MirrorResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        MirrorError::Store(format!("corrupt store file {}: {}", path.display(), e))
    })
}

fn write_json<T: serde::Serialize>(dir: &Path, file: &str, value: &T) -> MirrorResult<()> {
    std::fs::create_dir_all(dir)?;
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| MirrorError::Serialization(e.to_string()))?;

    let path = dir.join(file);
    let temp = dir.join(format!("{file}.tmp"));
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_store() -> (JsonFileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("calmirror-store-{}", std::process::id()))
            .join(format!("{:x}", fastrand::u64(..)));
        (JsonFileStore::new(&dir), dir)
    }

    #[test]
    fn test_records_survive_reopen() {
        let (store, dir) = temp_store();
        let record = MappingRecord {
            subscription_id: "sub-1".to_string(),
            source_event_id: "evt-1".to_string(),
            destination_event_id: "dest-1".to_string(),
            change_token: Some("etag-1".to_string()),
            content_hash: None,
            synced_at: Utc::now(),
        };
        store.upsert(&record).unwrap();
        drop(store);

        let reopened = JsonFileStore::new(&dir);
        let got = reopened.get("sub-1", "evt-1").unwrap().unwrap();
        assert_eq!(got.destination_event_id, "dest-1");
        assert_eq!(got.change_token.as_deref(), Some("etag-1"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let (store, dir) = temp_store();
        assert!(store.list("nobody").unwrap().is_empty());
        assert!(store.get_state("nobody", "last_cycle").unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_state_is_independent_of_mappings() {
        let (store, dir) = temp_store();
        store.set_state("sub-1", "last_cycle", "success").unwrap();
        assert!(store.list("sub-1").unwrap().is_empty());
        assert_eq!(
            store.get_state("sub-1", "last_cycle").unwrap().as_deref(),
            Some("success")
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
