//! Effective-permission queries against the link tables.

use sqlx::PgConnection;
use thiserror::Error;
use tracing::instrument;

use stagecraft_auth::PermissionSet;
use stagecraft_core::{OrganizationId, UserId, VenueId};

/// Target resource for a permission check.
///
/// Venue scope applies the organization fallback: when the caller has no
/// venue-specific link, the owning organization's link decides.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceScope {
    Organization(OrganizationId),
    Venue(VenueId),
}

impl core::fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceScope::Organization(id) => write!(f, "organization {id}"),
            ResourceScope::Venue(id) => write!(f, "venue {id}"),
        }
    }
}

/// Storage failure during permission resolution.
///
/// "No rows" is not one of these: a caller with no link rows simply has the
/// empty permission set.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("permission lookup failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Computes the caller's effective [`PermissionSet`] for a resource, inside
/// the caller's active transaction.
///
/// Effective means the BIT_OR union of every applicable link row: multiple
/// rows for the same (user, resource) pair merge rather than shadow.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    organization_sql: String,
    venue_sql: String,
}

impl PermissionResolver {
    /// Build the two lookup statements for a schema, once at startup.
    pub fn for_schema(schema: &str) -> Self {
        let organization_sql = format!(
            "SELECT BIT_OR(permissions) \
             FROM {schema}.organization_member_link \
             WHERE user_id = $1 AND organization_id = $2 AND has_joined"
        );
        // Venue-specific links win; only when none exist does the owning
        // organization's link apply.
        let venue_sql = format!(
            "SELECT COALESCE( \
               (SELECT BIT_OR(l.permissions) \
                  FROM {schema}.venue_member_link l \
                 WHERE l.user_id = $1 AND l.venue_id = $2), \
               (SELECT BIT_OR(l.permissions) \
                  FROM {schema}.organization_member_link l \
                  JOIN {schema}.venue v ON v.organization_id = l.organization_id \
                 WHERE l.user_id = $1 AND v.id = $2 AND l.has_joined) \
             )"
        );
        Self {
            organization_sql,
            venue_sql,
        }
    }

    #[instrument(skip(self, conn))]
    pub async fn organization_permissions(
        &self,
        conn: &mut PgConnection,
        user: UserId,
        organization: OrganizationId,
    ) -> Result<PermissionSet, ResolveError> {
        let value: Option<Option<i64>> = sqlx::query_scalar(&self.organization_sql)
            .bind(user.get())
            .bind(organization.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(decode(value))
    }

    #[instrument(skip(self, conn))]
    pub async fn effective_venue_permissions(
        &self,
        conn: &mut PgConnection,
        user: UserId,
        venue: VenueId,
    ) -> Result<PermissionSet, ResolveError> {
        let value: Option<Option<i64>> = sqlx::query_scalar(&self.venue_sql)
            .bind(user.get())
            .bind(venue.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(decode(value))
    }

    pub async fn resolve(
        &self,
        conn: &mut PgConnection,
        user: UserId,
        scope: ResourceScope,
    ) -> Result<PermissionSet, ResolveError> {
        match scope {
            ResourceScope::Organization(id) => self.organization_permissions(conn, user, id).await,
            ResourceScope::Venue(id) => self.effective_venue_permissions(conn, user, id).await,
        }
    }
}

/// No row and NULL aggregate both mean "no grants anywhere": the empty set.
fn decode(value: Option<Option<i64>>) -> PermissionSet {
    value
        .flatten()
        .map(PermissionSet::from_stored)
        .unwrap_or(PermissionSet::EMPTY)
}
