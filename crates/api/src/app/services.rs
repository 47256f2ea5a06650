//! Shared per-process state handed to every handler.

use sqlx::PgPool;

use stagecraft_infra::{
    AuthorizationGate, OwnershipLookup, PermissionLinkStore, PermissionResolver, ProjectionSql,
};
use stagecraft_projection::{DependencyMap, ProjectionRefresher};

/// Everything a handler needs, built once at startup.
///
/// All SQL is prepared per schema here so handlers never format statements on
/// the request path.
pub struct AppServices {
    pub pool: PgPool,
    pub gate: AuthorizationGate,
    pub refresher: ProjectionRefresher,
    pub projection_sql: ProjectionSql,
    pub links: PermissionLinkStore,
    pub ownership: OwnershipLookup,
    pub schema: String,
}

impl AppServices {
    pub fn build(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            gate: AuthorizationGate::new(PermissionResolver::for_schema(schema)),
            refresher: ProjectionRefresher::new(DependencyMap::for_schema(schema)),
            projection_sql: ProjectionSql::for_schema(schema),
            links: PermissionLinkStore::for_schema(schema),
            ownership: OwnershipLookup::for_schema(schema),
            schema: schema.to_string(),
        }
    }
}
