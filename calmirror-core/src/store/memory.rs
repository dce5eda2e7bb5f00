//! In-memory mapping store, for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::MirrorResult;
use crate::store::{MappingRecord, MappingStore};

#[derive(Default)]
pub struct MemoryStore {
    // Keyed by (subscription id, occurrence id)
    records: Mutex<HashMap<(String, String), MappingRecord>>,
    state: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryStore {
    fn get(
        &self,
        subscription_id: &str,
        occurrence_id: &str,
    ) -> MirrorResult<Option<MappingRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(subscription_id.to_string(), occurrence_id.to_string()))
            .cloned())
    }

    fn list(&self, subscription_id: &str) -> MirrorResult<Vec<MappingRecord>> {
        let records = self.records.lock().unwrap();
        let mut result: Vec<MappingRecord> = records
            .values()
            .filter(|r| r.subscription_id == subscription_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.source_event_id.cmp(&b.source_event_id));
        Ok(result)
    }

    fn upsert(&self, record: &MappingRecord) -> MirrorResult<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(
            (
                record.subscription_id.clone(),
                record.source_event_id.clone(),
            ),
            record.clone(),
        );
        Ok(())
    }

    fn delete(&self, subscription_id: &str, occurrence_id: &str) -> MirrorResult<()> {
        let mut records = self.records.lock().unwrap();
        records.remove(&(subscription_id.to_string(), occurrence_id.to_string()));
        Ok(())
    }

    fn get_state(&self, subscription_id: &str, key: &str) -> MirrorResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .get(&(subscription_id.to_string(), key.to_string()))
            .cloned())
    }

    fn set_state(&self, subscription_id: &str, key: &str, value: &str) -> MirrorResult<()> {
        let mut state = self.state.lock().unwrap();
        state.insert(
            (subscription_id.to_string(), key.to_string()),
            value.to_string(),
        );
        Ok(())
    }
}
