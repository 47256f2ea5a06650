//! Capability catalogue for admin UIs.
//!
//! Clients render permission toggles from this listing instead of hardcoding
//! bit positions.

use axum::Json;
use serde::Serialize;

use stagecraft_auth::{Capability, PermissionSet};

#[derive(Debug, Serialize)]
pub struct CapabilityEntry {
    pub name: &'static str,
    pub tier: &'static str,
    pub bit: u8,
}

#[derive(Debug, Serialize)]
pub struct CapabilityListing {
    pub capabilities: Vec<CapabilityEntry>,
    pub presets: PresetListing,
}

#[derive(Debug, Serialize)]
pub struct PresetListing {
    pub admin: i64,
    pub manager: i64,
    pub booker: i64,
}

/// GET /admin/permissions - List every capability and the named presets.
pub async fn list_capabilities() -> Json<CapabilityListing> {
    let capabilities = Capability::ALL
        .iter()
        .map(|c| CapabilityEntry {
            name: c.name(),
            tier: c.tier().as_str(),
            bit: c.bit(),
        })
        .collect();

    Json(CapabilityListing {
        capabilities,
        presets: PresetListing {
            admin: PermissionSet::ADMIN.to_stored(),
            manager: PermissionSet::MANAGER.to_stored(),
            booker: PermissionSet::BOOKER.to_stored(),
        },
    })
}
