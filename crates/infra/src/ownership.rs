//! Owning-organization lookups.
//!
//! Event- and date-level mutations are gated at the owning organization (or
//! venue); these resolve the chain inside the caller's transaction.

use sqlx::PgConnection;
use tracing::instrument;

use stagecraft_core::{EventDateId, EventId, OrganizationId, VenueId};

#[derive(Debug, Clone)]
pub struct OwnershipLookup {
    event_sql: String,
    event_date_sql: String,
    venue_sql: String,
}

impl OwnershipLookup {
    pub fn for_schema(schema: &str) -> Self {
        Self {
            event_sql: format!("SELECT e.organization_id FROM {schema}.event e WHERE e.id = $1"),
            event_date_sql: format!(
                "SELECT e.organization_id FROM {schema}.event_date ed \
                 JOIN {schema}.event e ON e.id = ed.event_id WHERE ed.id = $1"
            ),
            venue_sql: format!("SELECT v.organization_id FROM {schema}.venue v WHERE v.id = $1"),
        }
    }

    #[instrument(skip(self, conn))]
    pub async fn organization_of_event(
        &self,
        conn: &mut PgConnection,
        event: EventId,
    ) -> Result<Option<OrganizationId>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar(&self.event_sql)
            .bind(event.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id.map(OrganizationId::new))
    }

    #[instrument(skip(self, conn))]
    pub async fn organization_of_event_date(
        &self,
        conn: &mut PgConnection,
        date: EventDateId,
    ) -> Result<Option<OrganizationId>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar(&self.event_date_sql)
            .bind(date.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id.map(OrganizationId::new))
    }

    #[instrument(skip(self, conn))]
    pub async fn organization_of_venue(
        &self,
        conn: &mut PgConnection,
        venue: VenueId,
    ) -> Result<Option<OrganizationId>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar(&self.venue_sql)
            .bind(venue.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(id.map(OrganizationId::new))
    }
}
