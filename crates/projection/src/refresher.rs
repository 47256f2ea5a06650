//! Refresh orchestration: fan-out, dedupe, batched upsert, prune.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use crate::dependency::DependencyMap;
use crate::kind::EntityKind;

/// Failure inside the storage layer during a refresh step.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("id fan-out query failed: {0}")]
    Query(String),

    #[error("projection upsert failed: {0}")]
    Upsert(String),

    #[error("projection prune failed: {0}")]
    Prune(String),
}

/// Refresh failure. Either way the enclosing transaction must abort.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// No dependency entry for this kind. This is a programmer/config error.
    #[error("unsupported entity kind: {0}")]
    UnsupportedKind(EntityKind),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Storage operations the refresher needs, scoped to the caller's active
/// transaction.
///
/// The upserts must be idempotent: re-running with the same id set changes
/// nothing beyond the modification timestamp. The prunes delete projection
/// rows (among the given candidates) whose source row is gone or no longer
/// has a qualifying future date.
#[async_trait]
pub trait ProjectionStorage: Send {
    /// Run one fan-out query template with the changed ids as its single
    /// array parameter, returning the affected ids.
    async fn select_ids(&mut self, query: &str, changed: &[i64]) -> Result<Vec<i64>, StorageError>;

    async fn upsert_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError>;

    async fn upsert_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError>;

    async fn prune_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError>;

    async fn prune_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError>;
}

/// Counts of projection keys considered by one refresh, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub event_candidates: usize,
    pub event_date_candidates: usize,
}

/// Drives projection recomputation for one mutation.
///
/// Holds the (immutable) dependency map; storage is passed per call so the
/// refresher can be shared while each mutation brings its own transaction.
#[derive(Debug, Clone)]
pub struct ProjectionRefresher {
    map: DependencyMap,
}

impl ProjectionRefresher {
    pub fn new(map: DependencyMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &DependencyMap {
        &self.map
    }

    /// Recompute every projection row affected by a change to `changed_ids`
    /// of kind `kind`, inside the caller's transaction.
    ///
    /// Steps: empty fast path, dedupe, dependency lookup, per-table fan-out
    /// query + batched upsert + prune. Any failure propagates so the
    /// triggering mutation rolls back with the refresh; the two either
    /// commit together or not at all.
    ///
    /// For the identity kinds (`event`, `event_date`) the changed ids are
    /// folded into the candidate set themselves, so a deleted source row
    /// still reaches the prune step even though the fan-out query can no
    /// longer see it.
    #[instrument(skip(self, storage), fields(kind = %kind, changed = changed_ids.len()))]
    pub async fn refresh<S: ProjectionStorage>(
        &self,
        storage: &mut S,
        kind: EntityKind,
        changed_ids: &[i64],
    ) -> Result<RefreshOutcome, RefreshError> {
        if changed_ids.is_empty() {
            return Ok(RefreshOutcome::default());
        }

        let changed: Vec<i64> = changed_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let entry = self.map.lookup(kind)?;
        let mut outcome = RefreshOutcome::default();

        if let Some(query) = entry.event_ids.as_deref() {
            let mut candidates: BTreeSet<i64> =
                storage.select_ids(query, &changed).await?.into_iter().collect();
            if kind == EntityKind::Event {
                candidates.extend(changed.iter().copied());
            }
            if !candidates.is_empty() {
                let candidates: Vec<i64> = candidates.into_iter().collect();
                storage.upsert_event_rows(&candidates).await?;
                storage.prune_event_rows(&candidates).await?;
                outcome.event_candidates = candidates.len();
            }
        }

        if let Some(query) = entry.event_date_ids.as_deref() {
            let mut candidates: BTreeSet<i64> =
                storage.select_ids(query, &changed).await?.into_iter().collect();
            if kind == EntityKind::EventDate {
                candidates.extend(changed.iter().copied());
            }
            if !candidates.is_empty() {
                let candidates: Vec<i64> = candidates.into_iter().collect();
                storage.upsert_event_date_rows(&candidates).await?;
                storage.prune_event_date_rows(&candidates).await?;
                outcome.event_date_candidates = candidates.len();
            }
        }

        tracing::debug!(
            events = outcome.event_candidates,
            event_dates = outcome.event_date_candidates,
            "projection refresh complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::memory::InMemoryProjectionStorage;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
    }

    /// Two organizations, two venues, three events, four dates. Event 1 has
    /// one future and one past date, event 2 (other org) one future date,
    /// event 3 only a past date.
    fn fixture() -> InMemoryProjectionStorage {
        let mut s = InMemoryProjectionStorage::new(today());
        s.insert_organization(10, "Kulturhaus Nord");
        s.insert_organization(20, "Hafen Kollektiv");
        s.insert_venue(100, 10, "Grosse Halle", "Flensburg");
        s.insert_venue(200, 20, "Speicher 7", "Kiel");
        s.insert_space(1000, 100, "Saal A");
        s.insert_event(1, 10, Some(100), Some(1000), None, "Jazz im Saal");
        s.insert_event(2, 20, Some(200), None, None, "Hafenkonzert");
        s.insert_event(3, 10, Some(100), None, None, "Vergangenes Fest");
        s.insert_event_date(11, 1, None, None, today());
        s.insert_event_date(12, 1, None, None, today() - chrono::Days::new(30));
        s.insert_event_date(21, 2, None, None, today() + chrono::Days::new(7));
        s.insert_event_date(31, 3, None, None, today() - chrono::Days::new(1));
        s
    }

    fn refresher() -> ProjectionRefresher {
        ProjectionRefresher::new(InMemoryProjectionStorage::dependency_map())
    }

    #[tokio::test]
    async fn empty_ids_is_a_no_op() {
        let mut s = fixture();
        let outcome = refresher()
            .refresh(&mut s, EntityKind::Organization, &[])
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::default());
        assert_eq!(s.query_count(), 0);
    }

    #[tokio::test]
    async fn changed_ids_are_deduplicated() {
        let mut s = fixture();
        refresher()
            .refresh(&mut s, EntityKind::Event, &[1, 1, 1])
            .await
            .unwrap();
        // One fan-out query per slot, regardless of duplicate input ids.
        assert_eq!(s.query_count(), 2);
        assert_eq!(s.last_query_ids(), vec![1]);
    }

    #[tokio::test]
    async fn unsupported_kind_aborts() {
        let mut s = fixture();
        let map = DependencyMap::from_entries(Vec::new());
        let err = ProjectionRefresher::new(map)
            .refresh(&mut s, EntityKind::Venue, &[100])
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::UnsupportedKind(EntityKind::Venue)));
        assert!(s.events.is_empty());
    }

    #[tokio::test]
    async fn organization_fan_out_hits_all_owned_future_events_and_dates() {
        let mut s = fixture();
        refresher()
            .refresh(&mut s, EntityKind::Organization, &[10])
            .await
            .unwrap();

        // Event 1 qualifies (future date 11); event 3 is past-only.
        assert!(s.events.contains_key(&1));
        assert!(!s.events.contains_key(&3));
        // Org 20's event is untouched.
        assert!(!s.events.contains_key(&2));
        // Only the future-dated occurrence gets a row.
        assert!(s.event_dates.contains_key(&11));
        assert!(!s.event_dates.contains_key(&12));
        assert!(!s.event_dates.contains_key(&21));

        let row = &s.events[&1];
        assert_eq!(row.organization_name, "Kulturhaus Nord");
        assert_eq!(row.venue_name.as_deref(), Some("Grosse Halle"));
        assert_eq!(row.title, "Jazz im Saal");
    }

    #[tokio::test]
    async fn past_only_event_is_excluded_even_when_named_directly() {
        let mut s = fixture();
        refresher()
            .refresh(&mut s, EntityKind::Event, &[3])
            .await
            .unwrap();
        assert!(!s.events.contains_key(&3));
    }

    #[tokio::test]
    async fn event_date_change_does_not_touch_the_event_row() {
        let mut s = fixture();
        refresher()
            .refresh(&mut s, EntityKind::EventDate, &[11])
            .await
            .unwrap();
        assert!(s.events.is_empty());
        assert!(s.event_dates.contains_key(&11));
    }

    #[tokio::test]
    async fn image_change_refreshes_events_only() {
        let mut s = fixture();
        s.set_event_image(1, Some(500));
        refresher()
            .refresh(&mut s, EntityKind::Image, &[500])
            .await
            .unwrap();
        assert!(s.events.contains_key(&1));
        assert!(s.event_dates.is_empty());
    }

    #[tokio::test]
    async fn refresh_is_idempotent_up_to_the_timestamp() {
        let mut s = fixture();
        let r = refresher();
        r.refresh(&mut s, EntityKind::Organization, &[10, 20]).await.unwrap();
        let first_events = s.events.clone();
        let first_dates = s.event_dates.clone();

        r.refresh(&mut s, EntityKind::Organization, &[10, 20]).await.unwrap();

        assert_eq!(s.events.len(), first_events.len());
        for (id, row) in &s.events {
            let before = &first_events[id];
            assert!(row.modified_at >= before.modified_at);
            let mut normalized = row.clone();
            normalized.modified_at = before.modified_at;
            assert_eq!(&normalized, before);
        }
        assert_eq!(s.event_dates.len(), first_dates.len());
        for (id, row) in &s.event_dates {
            let before = &first_dates[id];
            let mut normalized = row.clone();
            normalized.modified_at = before.modified_at;
            assert_eq!(&normalized, before);
        }
    }

    #[tokio::test]
    async fn mutation_then_refresh_updates_the_projection() {
        let mut s = fixture();
        let r = refresher();
        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();
        let stamp = s.events[&1].modified_at;

        s.set_event_title(1, "Jazz im Saal — Sommerspecial");
        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();

        let row = &s.events[&1];
        assert_eq!(row.title, "Jazz im Saal — Sommerspecial");
        assert!(row.modified_at >= stamp);
        // All of the event's future dates were refreshed too.
        assert!(s.event_dates.contains_key(&11));
    }

    #[tokio::test]
    async fn stale_rows_are_pruned_on_refresh() {
        let mut s = fixture();
        let r = refresher();
        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();
        assert!(s.events.contains_key(&1));
        assert!(s.event_dates.contains_key(&11));

        // The only future occurrence disappears; the next refresh must take
        // the event row and the date row with it.
        s.remove_event_date(11);
        r.refresh(&mut s, EntityKind::EventDate, &[11]).await.unwrap();
        assert!(!s.event_dates.contains_key(&11));

        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();
        assert!(!s.events.contains_key(&1));
    }

    #[tokio::test]
    async fn deleted_event_still_reaches_the_prune_step() {
        let mut s = fixture();
        let r = refresher();
        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();
        assert!(s.events.contains_key(&1));

        s.remove_event(1);
        r.refresh(&mut s, EntityKind::Event, &[1]).await.unwrap();
        assert!(!s.events.contains_key(&1));
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let mut s = fixture();
        s.fail_next_upsert("disk full");
        let err = refresher()
            .refresh(&mut s, EntityKind::Event, &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Storage(StorageError::Upsert(_))));
    }

    #[tokio::test]
    async fn venue_override_on_a_date_resolves_to_the_date_venue() {
        let mut s = fixture();
        // Date 21 moves to venue 100 while its event stays at venue 200.
        s.set_event_date_venue(21, Some(100));
        refresher()
            .refresh(&mut s, EntityKind::EventDate, &[21])
            .await
            .unwrap();
        let row = &s.event_dates[&21];
        assert_eq!(row.venue_id, Some(100));
        assert_eq!(row.venue_name.as_deref(), Some("Grosse Halle"));
    }
}
