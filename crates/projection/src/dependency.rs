//! The static dependency map: source entity kind → fan-out query templates.
//!
//! The map is explicit, immutable configuration: built once at process start
//! (schema name interpolated exactly once) and passed by reference into the
//! refresher. There is no lazy memoized state, which keeps first-call latency
//! flat and lets tests inject a fake map with sentinel query strings.

use std::collections::HashMap;

use crate::kind::EntityKind;
use crate::refresher::RefreshError;

/// Fan-out queries for one source entity kind.
///
/// Each slot is a query taking one `BIGINT[]` parameter (the changed source
/// ids) and returning the affected projection key ids. A slot is `None` when
/// a change to this kind can never affect that projection table: an image
/// change affects events but never event-date rows, an event-date change
/// affects only its own row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    pub event_ids: Option<String>,
    pub event_date_ids: Option<String>,
}

impl DependencyEntry {
    pub fn new(
        event_ids: Option<impl Into<String>>,
        event_date_ids: Option<impl Into<String>>,
    ) -> Self {
        Self {
            event_ids: event_ids.map(Into::into),
            event_date_ids: event_date_ids.map(Into::into),
        }
    }
}

/// Immutable kind → fan-out table, complete for all supported kinds.
#[derive(Debug, Clone)]
pub struct DependencyMap {
    entries: HashMap<EntityKind, DependencyEntry>,
}

impl DependencyMap {
    /// Build a map from explicit entries (used by tests with a fake map).
    pub fn from_entries(entries: impl IntoIterator<Item = (EntityKind, DependencyEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The production map for a Postgres schema.
    pub fn for_schema(schema: &str) -> Self {
        let entries = [
            (
                EntityKind::Organization,
                DependencyEntry::new(
                    Some(format!(
                        "SELECT id FROM {schema}.event WHERE organization_id = ANY($1)"
                    )),
                    Some(format!(
                        "SELECT ed.id FROM {schema}.event_date ed \
                         JOIN {schema}.event e ON e.id = ed.event_id \
                         WHERE e.organization_id = ANY($1)"
                    )),
                ),
            ),
            (
                EntityKind::Venue,
                DependencyEntry::new(
                    Some(format!(
                        "SELECT id FROM {schema}.event WHERE venue_id = ANY($1)"
                    )),
                    Some(format!(
                        "SELECT id FROM {schema}.event_date WHERE venue_id = ANY($1)"
                    )),
                ),
            ),
            (
                EntityKind::Space,
                DependencyEntry::new(
                    Some(format!(
                        "SELECT id FROM {schema}.event WHERE space_id = ANY($1)"
                    )),
                    Some(format!(
                        "SELECT id FROM {schema}.event_date WHERE space_id = ANY($1)"
                    )),
                ),
            ),
            (
                EntityKind::Event,
                DependencyEntry::new(
                    Some(format!("SELECT id FROM {schema}.event WHERE id = ANY($1)")),
                    Some(format!(
                        "SELECT id FROM {schema}.event_date WHERE event_id = ANY($1)"
                    )),
                ),
            ),
            (
                EntityKind::EventDate,
                // A date change never recomputes the parent event row.
                DependencyEntry::new(
                    None::<String>,
                    Some(format!(
                        "SELECT id FROM {schema}.event_date WHERE id = ANY($1)"
                    )),
                ),
            ),
            (
                EntityKind::Image,
                // Primary-image changes surface on the event row only.
                DependencyEntry::new(
                    Some(format!(
                        "SELECT id FROM {schema}.event WHERE image_id = ANY($1)"
                    )),
                    None::<String>,
                ),
            ),
        ];
        Self::from_entries(entries)
    }

    /// Resolve the entry for a kind.
    ///
    /// A missing kind is a programmer/config error, not a user error: the
    /// caller must abort its transaction rather than silently skip the
    /// refresh, because a skipped refresh is an invisible read-model
    /// inconsistency.
    pub fn lookup(&self, kind: EntityKind) -> Result<&DependencyEntry, RefreshError> {
        self.entries
            .get(&kind)
            .ok_or(RefreshError::UnsupportedKind(kind))
    }
}
