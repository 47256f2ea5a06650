//! Source entity kinds that can trigger a projection refresh.

use serde::{Deserialize, Serialize};

/// A normalized source entity kind.
///
/// Every mutating handler names the kind it touched when requesting a
/// refresh; the dependency map translates the kind into fan-out queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Venue,
    Space,
    Event,
    EventDate,
    Image,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Venue => "venue",
            EntityKind::Space => "space",
            EntityKind::Event => "event",
            EntityKind::EventDate => "event_date",
            EntityKind::Image => "image",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
