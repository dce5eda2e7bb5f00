//! Reconciliation engine.
//!
//! One cycle makes the destination an exact reflection of a subscription's
//! source inside the sync window. The cycle is a sequence of independent
//! idempotent operations, never a transaction: every occurrence-level
//! success leaves a durable mapping even if a later operation fails, and
//! re-running with unchanged source data performs zero further mutations.

use std::collections::HashSet;

use chrono::Utc;

use crate::destination::{CalendarDestination, EventPayload};
use crate::error::MirrorResult;
use crate::retry::{RetryPolicy, with_retry};
use crate::source::EventSource;
use crate::store::{MappingRecord, MappingStore};
use crate::window::SyncWindow;

/// Per-subscription state key holding the last cycle outcome
/// (`success` or `failed:<timestamp>`).
pub const LAST_CYCLE_STATE_KEY: &str = "last_cycle";

/// Counters for one completed cycle. `fetched` is the source's raw
/// pre-filter count; `considered` is the number of in-window occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub fetched: usize,
    pub considered: usize,
}

impl CycleStats {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

pub struct ReconciliationEngine<'a, D, M> {
    destination: &'a D,
    store: &'a M,
    retry: RetryPolicy,
}

impl<'a, D, M> ReconciliationEngine<'a, D, M>
where
    D: CalendarDestination + Sync,
    M: MappingStore,
{
    pub fn new(destination: &'a D, store: &'a M) -> Self {
        ReconciliationEngine {
            destination,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one reconciliation cycle for a subscription. The outcome is
    /// persisted as subscription state regardless of success, then the
    /// result is returned to the caller.
    pub async fn run_cycle(
        &self,
        subscription_id: &str,
        source: &(impl EventSource + Sync),
        source_kind: &str,
        window: &SyncWindow,
    ) -> MirrorResult<CycleStats> {
        let result = self
            .reconcile(subscription_id, source, source_kind, window)
            .await;

        let outcome = match &result {
            Ok(_) => "success".to_string(),
            Err(_) => format!("failed:{}", Utc::now().to_rfc3339()),
        };
        self.store
            .set_state(subscription_id, LAST_CYCLE_STATE_KEY, &outcome)?;

        result
    }

    async fn reconcile(
        &self,
        subscription_id: &str,
        source: &(impl EventSource + Sync),
        source_kind: &str,
        window: &SyncWindow,
    ) -> MirrorResult<CycleStats> {
        let snapshot = with_retry("list occurrences", &self.retry, || {
            source.list_occurrences(window)
        })
        .await?;

        let mut stats = CycleStats {
            fetched: snapshot.fetched,
            considered: snapshot.occurrences.len(),
            ..Default::default()
        };

        // Cancelled occurrences are excluded here so they reconcile exactly
        // like occurrences that disappeared from the source.
        let active: Vec<_> = snapshot
            .occurrences
            .iter()
            .filter(|o| !o.is_cancelled)
            .collect();
        let active_ids: HashSet<&str> = active.iter().map(|o| o.id.as_str()).collect();

        let existing = self.store.list(subscription_id)?;

        for occurrence in active {
            let payload = EventPayload::from_occurrence(occurrence, subscription_id, source_kind);
            let fingerprint = payload.fingerprint();

            match self.store.get(subscription_id, &occurrence.id)? {
                None => {
                    let created = with_retry("create event", &self.retry, || {
                        self.destination.create_event(&payload)
                    })
                    .await?;
                    self.record_mapping(subscription_id, &occurrence.id, created, fingerprint)?;
                    stats.created += 1;
                }
                Some(mapping) if mapping.content_hash.as_deref() == Some(fingerprint.as_str()) => {
                    log::debug!("{subscription_id}/{}: unchanged, skipping", occurrence.id);
                }
                Some(mapping) => {
                    match with_retry("update event", &self.retry, || {
                        self.destination
                            .update_event(&mapping.destination_event_id, &payload)
                    })
                    .await
                    {
                        Ok(updated) => {
                            self.record_mapping(
                                subscription_id,
                                &occurrence.id,
                                updated,
                                fingerprint,
                            )?;
                            stats.updated += 1;
                        }
                        Err(err) if err.is_not_found() => {
                            // The destination object disappeared out-of-band.
                            // Recreate it and overwrite the mapping.
                            log::info!(
                                "{subscription_id}/{}: destination event {} gone, recreating",
                                occurrence.id,
                                mapping.destination_event_id
                            );
                            let created = with_retry("recreate event", &self.retry, || {
                                self.destination.create_event(&payload)
                            })
                            .await?;
                            self.record_mapping(
                                subscription_id,
                                &occurrence.id,
                                created,
                                fingerprint,
                            )?;
                            stats.created += 1;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        // Stale mappings cover both removed and newly-cancelled occurrences.
        for mapping in existing
            .iter()
            .filter(|m| !active_ids.contains(m.source_event_id.as_str()))
        {
            let delete = with_retry("delete event", &self.retry, || {
                self.destination.delete_event(&mapping.destination_event_id)
            })
            .await;
            match delete {
                Ok(()) => {}
                // Already gone is the outcome we wanted.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
            self.store.delete(subscription_id, &mapping.source_event_id)?;
            stats.deleted += 1;
        }

        Ok(stats)
    }

    fn record_mapping(
        &self,
        subscription_id: &str,
        occurrence_id: &str,
        written: crate::destination::DestinationEvent,
        fingerprint: String,
    ) -> MirrorResult<()> {
        self.store.upsert(&MappingRecord {
            subscription_id: subscription_id.to_string(),
            source_event_id: occurrence_id.to_string(),
            destination_event_id: written.id,
            change_token: written.change_token,
            content_hash: Some(fingerprint),
            synced_at: Utc::now(),
        })
    }
}

/// Read back the last persisted cycle outcome for a subscription.
pub fn last_cycle_outcome(
    store: &impl MappingStore,
    subscription_id: &str,
) -> MirrorResult<Option<String>> {
    store.get_state(subscription_id, LAST_CYCLE_STATE_KEY)
}
