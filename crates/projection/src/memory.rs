//! In-memory `ProjectionStorage` for tests and dev.
//!
//! Holds small normalized fixture tables plus the two projection maps, and
//! answers the fan-out queries of its own sentinel dependency map (see
//! [`InMemoryProjectionStorage::dependency_map`]). "Today" is injected so
//! the future-date predicate is deterministic under test.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::dependency::{DependencyEntry, DependencyMap};
use crate::kind::EntityKind;
use crate::refresher::{ProjectionStorage, StorageError};

#[derive(Debug, Clone)]
struct OrganizationRow {
    name: String,
}

#[derive(Debug, Clone)]
struct VenueRow {
    #[allow(dead_code)]
    organization_id: i64,
    name: String,
    city: String,
}

#[derive(Debug, Clone)]
struct SpaceRow {
    #[allow(dead_code)]
    venue_id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct EventRow {
    organization_id: i64,
    venue_id: Option<i64>,
    space_id: Option<i64>,
    image_id: Option<i64>,
    title: String,
}

#[derive(Debug, Clone)]
struct EventDateRow {
    event_id: i64,
    venue_id: Option<i64>,
    space_id: Option<i64>,
    start_date: NaiveDate,
}

/// Denormalized event row, one per event with a future occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventProjectionRow {
    pub event_id: i64,
    pub organization_id: i64,
    pub organization_name: String,
    pub venue_id: Option<i64>,
    pub venue_name: Option<String>,
    pub venue_city: Option<String>,
    pub space_id: Option<i64>,
    pub space_name: Option<String>,
    pub title: String,
    /// Most-imminent future occurrence, the representative date.
    pub next_start: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Denormalized occurrence row, one per future-dated event date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDateProjectionRow {
    pub event_date_id: i64,
    pub event_id: i64,
    /// Resolved venue: the date's own override, else the parent event's.
    pub venue_id: Option<i64>,
    pub venue_name: Option<String>,
    pub space_id: Option<i64>,
    pub space_name: Option<String>,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Fixture-backed projection storage.
#[derive(Debug)]
pub struct InMemoryProjectionStorage {
    today: NaiveDate,

    organizations: BTreeMap<i64, OrganizationRow>,
    venues: BTreeMap<i64, VenueRow>,
    spaces: BTreeMap<i64, SpaceRow>,
    source_events: BTreeMap<i64, EventRow>,
    source_event_dates: BTreeMap<i64, EventDateRow>,

    pub events: BTreeMap<i64, EventProjectionRow>,
    pub event_dates: BTreeMap<i64, EventDateProjectionRow>,

    query_count: usize,
    last_query_ids: Vec<i64>,
    fail_next_upsert: Option<String>,
}

impl InMemoryProjectionStorage {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            organizations: BTreeMap::new(),
            venues: BTreeMap::new(),
            spaces: BTreeMap::new(),
            source_events: BTreeMap::new(),
            source_event_dates: BTreeMap::new(),
            events: BTreeMap::new(),
            event_dates: BTreeMap::new(),
            query_count: 0,
            last_query_ids: Vec::new(),
            fail_next_upsert: None,
        }
    }

    /// Sentinel dependency map mirroring the production fan-out table; the
    /// query slots carry tokens this storage knows how to answer.
    pub fn dependency_map() -> DependencyMap {
        DependencyMap::from_entries([
            (
                EntityKind::Organization,
                DependencyEntry::new(Some("events-by-organization"), Some("event-dates-by-organization")),
            ),
            (
                EntityKind::Venue,
                DependencyEntry::new(Some("events-by-venue"), Some("event-dates-by-venue")),
            ),
            (
                EntityKind::Space,
                DependencyEntry::new(Some("events-by-space"), Some("event-dates-by-space")),
            ),
            (
                EntityKind::Event,
                DependencyEntry::new(Some("events-by-id"), Some("event-dates-by-event")),
            ),
            (
                EntityKind::EventDate,
                DependencyEntry::new(None::<String>, Some("event-dates-by-id")),
            ),
            (
                EntityKind::Image,
                DependencyEntry::new(Some("events-by-image"), None::<String>),
            ),
        ])
    }

    // Fixture setup ---------------------------------------------------------

    pub fn insert_organization(&mut self, id: i64, name: &str) {
        self.organizations.insert(id, OrganizationRow { name: name.to_string() });
    }

    pub fn insert_venue(&mut self, id: i64, organization_id: i64, name: &str, city: &str) {
        self.venues.insert(
            id,
            VenueRow {
                organization_id,
                name: name.to_string(),
                city: city.to_string(),
            },
        );
    }

    pub fn insert_space(&mut self, id: i64, venue_id: i64, name: &str) {
        self.spaces.insert(id, SpaceRow { venue_id, name: name.to_string() });
    }

    pub fn insert_event(
        &mut self,
        id: i64,
        organization_id: i64,
        venue_id: Option<i64>,
        space_id: Option<i64>,
        image_id: Option<i64>,
        title: &str,
    ) {
        self.source_events.insert(
            id,
            EventRow {
                organization_id,
                venue_id,
                space_id,
                image_id,
                title: title.to_string(),
            },
        );
    }

    pub fn insert_event_date(
        &mut self,
        id: i64,
        event_id: i64,
        venue_id: Option<i64>,
        space_id: Option<i64>,
        start_date: NaiveDate,
    ) {
        self.source_event_dates
            .insert(id, EventDateRow { event_id, venue_id, space_id, start_date });
    }

    // Source mutations used by tests ---------------------------------------

    pub fn set_event_title(&mut self, id: i64, title: &str) {
        if let Some(e) = self.source_events.get_mut(&id) {
            e.title = title.to_string();
        }
    }

    pub fn set_event_image(&mut self, id: i64, image_id: Option<i64>) {
        if let Some(e) = self.source_events.get_mut(&id) {
            e.image_id = image_id;
        }
    }

    pub fn set_event_date_venue(&mut self, id: i64, venue_id: Option<i64>) {
        if let Some(d) = self.source_event_dates.get_mut(&id) {
            d.venue_id = venue_id;
        }
    }

    pub fn remove_event(&mut self, id: i64) {
        self.source_events.remove(&id);
    }

    pub fn remove_event_date(&mut self, id: i64) {
        self.source_event_dates.remove(&id);
    }

    // Introspection ---------------------------------------------------------

    pub fn query_count(&self) -> usize {
        self.query_count
    }

    /// The changed-id parameter of the most recent fan-out query.
    pub fn last_query_ids(&self) -> Vec<i64> {
        self.last_query_ids.clone()
    }

    /// Make the next upsert call fail with the given message.
    pub fn fail_next_upsert(&mut self, message: &str) {
        self.fail_next_upsert = Some(message.to_string());
    }

    // Internals -------------------------------------------------------------

    fn event_qualifies(&self, event_id: i64) -> bool {
        self.source_events.contains_key(&event_id)
            && self
                .source_event_dates
                .values()
                .any(|d| d.event_id == event_id && d.start_date >= self.today)
    }

    fn next_start(&self, event_id: i64) -> Option<NaiveDate> {
        self.source_event_dates
            .values()
            .filter(|d| d.event_id == event_id && d.start_date >= self.today)
            .map(|d| d.start_date)
            .min()
    }

    fn take_upsert_failure(&mut self) -> Result<(), StorageError> {
        match self.fail_next_upsert.take() {
            Some(msg) => Err(StorageError::Upsert(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProjectionStorage for InMemoryProjectionStorage {
    async fn select_ids(&mut self, query: &str, changed: &[i64]) -> Result<Vec<i64>, StorageError> {
        self.query_count += 1;
        self.last_query_ids = changed.to_vec();
        let changed: BTreeSet<i64> = changed.iter().copied().collect();

        let ids = match query {
            "events-by-organization" => self
                .source_events
                .iter()
                .filter(|(_, e)| changed.contains(&e.organization_id))
                .map(|(id, _)| *id)
                .collect(),
            "event-dates-by-organization" => self
                .source_event_dates
                .iter()
                .filter(|(_, d)| {
                    self.source_events
                        .get(&d.event_id)
                        .is_some_and(|e| changed.contains(&e.organization_id))
                })
                .map(|(id, _)| *id)
                .collect(),
            "events-by-venue" => self
                .source_events
                .iter()
                .filter(|(_, e)| e.venue_id.is_some_and(|v| changed.contains(&v)))
                .map(|(id, _)| *id)
                .collect(),
            "event-dates-by-venue" => self
                .source_event_dates
                .iter()
                .filter(|(_, d)| d.venue_id.is_some_and(|v| changed.contains(&v)))
                .map(|(id, _)| *id)
                .collect(),
            "events-by-space" => self
                .source_events
                .iter()
                .filter(|(_, e)| e.space_id.is_some_and(|s| changed.contains(&s)))
                .map(|(id, _)| *id)
                .collect(),
            "event-dates-by-space" => self
                .source_event_dates
                .iter()
                .filter(|(_, d)| d.space_id.is_some_and(|s| changed.contains(&s)))
                .map(|(id, _)| *id)
                .collect(),
            "events-by-id" => self
                .source_events
                .keys()
                .filter(|id| changed.contains(id))
                .copied()
                .collect(),
            "event-dates-by-event" => self
                .source_event_dates
                .iter()
                .filter(|(_, d)| changed.contains(&d.event_id))
                .map(|(id, _)| *id)
                .collect(),
            "event-dates-by-id" => self
                .source_event_dates
                .keys()
                .filter(|id| changed.contains(id))
                .copied()
                .collect(),
            "events-by-image" => self
                .source_events
                .iter()
                .filter(|(_, e)| e.image_id.is_some_and(|i| changed.contains(&i)))
                .map(|(id, _)| *id)
                .collect(),
            other => {
                return Err(StorageError::Query(format!("unknown query template: {other}")));
            }
        };
        Ok(ids)
    }

    async fn upsert_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError> {
        self.take_upsert_failure()?;
        let now = Utc::now();
        for id in event_ids {
            if !self.event_qualifies(*id) {
                continue;
            }
            let event = &self.source_events[id];
            let organization_name = self
                .organizations
                .get(&event.organization_id)
                .map(|o| o.name.clone())
                .unwrap_or_default();
            let venue = event.venue_id.and_then(|v| self.venues.get(&v));
            let space = event.space_id.and_then(|s| self.spaces.get(&s));
            let created_at = self.events.get(id).map(|r| r.created_at).unwrap_or(now);
            self.events.insert(
                *id,
                EventProjectionRow {
                    event_id: *id,
                    organization_id: event.organization_id,
                    organization_name,
                    venue_id: event.venue_id,
                    venue_name: venue.map(|v| v.name.clone()),
                    venue_city: venue.map(|v| v.city.clone()),
                    space_id: event.space_id,
                    space_name: space.map(|s| s.name.clone()),
                    title: event.title.clone(),
                    next_start: self.next_start(*id).expect("qualifying event has a future date"),
                    created_at,
                    modified_at: now,
                },
            );
        }
        Ok(())
    }

    async fn upsert_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError> {
        self.take_upsert_failure()?;
        let now = Utc::now();
        for id in event_date_ids {
            let Some(date) = self.source_event_dates.get(id) else {
                continue;
            };
            if date.start_date < self.today {
                continue;
            }
            let event = self.source_events.get(&date.event_id);
            let venue_id = date.venue_id.or(event.and_then(|e| e.venue_id));
            let space_id = date.space_id.or(event.and_then(|e| e.space_id));
            let venue = venue_id.and_then(|v| self.venues.get(&v));
            let space = space_id.and_then(|s| self.spaces.get(&s));
            let created_at = self.event_dates.get(id).map(|r| r.created_at).unwrap_or(now);
            self.event_dates.insert(
                *id,
                EventDateProjectionRow {
                    event_date_id: *id,
                    event_id: date.event_id,
                    venue_id,
                    venue_name: venue.map(|v| v.name.clone()),
                    space_id,
                    space_name: space.map(|s| s.name.clone()),
                    start_date: date.start_date,
                    created_at,
                    modified_at: now,
                },
            );
        }
        Ok(())
    }

    async fn prune_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError> {
        for id in event_ids {
            if !self.event_qualifies(*id) {
                self.events.remove(id);
            }
        }
        Ok(())
    }

    async fn prune_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError> {
        for id in event_date_ids {
            let keep = self
                .source_event_dates
                .get(id)
                .is_some_and(|d| d.start_date >= self.today);
            if !keep {
                self.event_dates.remove(id);
            }
        }
        Ok(())
    }
}
