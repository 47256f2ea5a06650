//! Postgres implementation of `ProjectionStorage`.
//!
//! The four statements are built once per process (schema interpolated at
//! startup) and shared; each refresh borrows the caller's transaction so the
//! upserts commit or roll back with the triggering mutation.
//!
//! Upsert shape: `INSERT ... SELECT DISTINCT ON (key) ... ON CONFLICT (key)
//! DO UPDATE`, so re-running with the same id set changes nothing but
//! `modified_at`. The `DISTINCT ON` picks one representative row per event
//! (the most imminent future occurrence) and the `start_date >= CURRENT_DATE`
//! predicate keeps past-only events out. The prune statements delete rows,
//! among the candidates just considered, whose source no longer qualifies.

use async_trait::async_trait;
use sqlx::PgConnection;

use stagecraft_projection::{ProjectionStorage, StorageError};

/// The schema-bound statement set for both projection tables.
#[derive(Debug, Clone)]
pub struct ProjectionSql {
    event_upsert: String,
    event_date_upsert: String,
    event_prune: String,
    event_date_prune: String,
}

impl ProjectionSql {
    pub fn for_schema(schema: &str) -> Self {
        let event_upsert = format!(
            r#"
INSERT INTO {schema}.event_projection (
    event_id, organization_id, venue_id, space_id, release_status_id,
    title, subtitle, description, summary, image_id, types,
    price_type_id, currency_code, min_price, max_price, search_text,
    organization_name, organization_website_url,
    venue_name, venue_street, venue_postal_code, venue_city, venue_country_code,
    space_name, space_total_capacity,
    next_start_date, created_at, modified_at
)
SELECT DISTINCT ON (e.id)
    e.id, e.organization_id, e.venue_id, e.space_id, e.release_status_id,
    e.title, e.subtitle, e.description, e.summary, e.image_id,
    COALESCE(
        (SELECT jsonb_agg(jsonb_build_array(etl.type_id, etl.genre_id))
         FROM {schema}.event_type_link etl WHERE etl.event_id = e.id),
        '[]'::jsonb
    ),
    e.price_type_id, e.currency_code, e.min_price, e.max_price, e.search_text,
    o.name, o.website_url,
    COALESCE(v.name, el.name),
    COALESCE(v.street, el.street),
    COALESCE(v.postal_code, el.postal_code),
    COALESCE(v.city, el.city),
    COALESCE(v.country_code, el.country_code),
    sp.name, sp.total_capacity,
    ed.start_date, NOW(), NOW()
FROM {schema}.event e
LEFT JOIN {schema}.organization o ON o.id = e.organization_id
LEFT JOIN {schema}.venue v ON v.id = e.venue_id
LEFT JOIN {schema}.space sp ON sp.id = e.space_id
LEFT JOIN {schema}.event_location el ON el.id = e.location_id
JOIN {schema}.event_date ed ON ed.event_id = e.id
WHERE e.id = ANY($1)
  AND ed.start_date >= CURRENT_DATE
ORDER BY e.id, ed.start_date
ON CONFLICT (event_id) DO UPDATE SET
    organization_id = EXCLUDED.organization_id,
    venue_id = EXCLUDED.venue_id,
    space_id = EXCLUDED.space_id,
    release_status_id = EXCLUDED.release_status_id,
    title = EXCLUDED.title,
    subtitle = EXCLUDED.subtitle,
    description = EXCLUDED.description,
    summary = EXCLUDED.summary,
    image_id = EXCLUDED.image_id,
    types = EXCLUDED.types,
    price_type_id = EXCLUDED.price_type_id,
    currency_code = EXCLUDED.currency_code,
    min_price = EXCLUDED.min_price,
    max_price = EXCLUDED.max_price,
    search_text = EXCLUDED.search_text,
    organization_name = EXCLUDED.organization_name,
    organization_website_url = EXCLUDED.organization_website_url,
    venue_name = EXCLUDED.venue_name,
    venue_street = EXCLUDED.venue_street,
    venue_postal_code = EXCLUDED.venue_postal_code,
    venue_city = EXCLUDED.venue_city,
    venue_country_code = EXCLUDED.venue_country_code,
    space_name = EXCLUDED.space_name,
    space_total_capacity = EXCLUDED.space_total_capacity,
    next_start_date = EXCLUDED.next_start_date,
    modified_at = NOW()
"#
        );

        let event_date_upsert = format!(
            r#"
INSERT INTO {schema}.event_date_projection (
    event_date_id, event_id, venue_id, space_id,
    venue_name, venue_street, venue_postal_code, venue_city, venue_country_code,
    space_name, space_total_capacity,
    start_date, start_time, end_date, end_time, all_day,
    ticket_link, availability_status_id,
    created_at, modified_at
)
SELECT DISTINCT ON (ed.id)
    ed.id, ed.event_id,
    COALESCE(ed.venue_id, e.venue_id),
    COALESCE(ed.space_id, e.space_id),
    v.name, v.street, v.postal_code, v.city, v.country_code,
    sp.name, sp.total_capacity,
    ed.start_date, ed.start_time, ed.end_date, ed.end_time, ed.all_day,
    ed.ticket_link, ed.availability_status_id,
    NOW(), NOW()
FROM {schema}.event_date ed
LEFT JOIN {schema}.event e ON e.id = ed.event_id
LEFT JOIN {schema}.venue v ON v.id = COALESCE(ed.venue_id, e.venue_id)
LEFT JOIN {schema}.space sp ON sp.id = COALESCE(ed.space_id, e.space_id)
WHERE ed.id = ANY($1)
  AND ed.start_date >= CURRENT_DATE
ON CONFLICT (event_date_id) DO UPDATE SET
    venue_id = EXCLUDED.venue_id,
    space_id = EXCLUDED.space_id,
    venue_name = EXCLUDED.venue_name,
    venue_street = EXCLUDED.venue_street,
    venue_postal_code = EXCLUDED.venue_postal_code,
    venue_city = EXCLUDED.venue_city,
    venue_country_code = EXCLUDED.venue_country_code,
    space_name = EXCLUDED.space_name,
    space_total_capacity = EXCLUDED.space_total_capacity,
    start_date = EXCLUDED.start_date,
    start_time = EXCLUDED.start_time,
    end_date = EXCLUDED.end_date,
    end_time = EXCLUDED.end_time,
    all_day = EXCLUDED.all_day,
    ticket_link = EXCLUDED.ticket_link,
    availability_status_id = EXCLUDED.availability_status_id,
    modified_at = NOW()
"#
        );

        // A candidate is stale when its source event is gone (no FK cascade
        // on the projection tables) or when no future-dated occurrence is
        // left.
        let event_prune = format!(
            "DELETE FROM {schema}.event_projection p \
             WHERE p.event_id = ANY($1) \
               AND (NOT EXISTS ( \
                      SELECT 1 FROM {schema}.event e WHERE e.id = p.event_id) \
                 OR NOT EXISTS ( \
                      SELECT 1 FROM {schema}.event_date ed \
                      WHERE ed.event_id = p.event_id AND ed.start_date >= CURRENT_DATE))"
        );

        let event_date_prune = format!(
            "DELETE FROM {schema}.event_date_projection p \
             WHERE p.event_date_id = ANY($1) \
               AND NOT EXISTS ( \
                 SELECT 1 FROM {schema}.event_date ed \
                 WHERE ed.id = p.event_date_id AND ed.start_date >= CURRENT_DATE)"
        );

        Self {
            event_upsert,
            event_date_upsert,
            event_prune,
            event_date_prune,
        }
    }
}

/// `ProjectionStorage` over a borrowed transaction connection.
pub struct PostgresProjectionStorage<'a> {
    conn: &'a mut PgConnection,
    sql: &'a ProjectionSql,
}

impl<'a> PostgresProjectionStorage<'a> {
    pub fn new(conn: &'a mut PgConnection, sql: &'a ProjectionSql) -> Self {
        Self { conn, sql }
    }
}

#[async_trait]
impl ProjectionStorage for PostgresProjectionStorage<'_> {
    async fn select_ids(&mut self, query: &str, changed: &[i64]) -> Result<Vec<i64>, StorageError> {
        sqlx::query_scalar(query)
            .bind(changed)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn upsert_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError> {
        sqlx::query(&self.sql.event_upsert)
            .bind(event_ids)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Upsert(e.to_string()))?;
        Ok(())
    }

    async fn upsert_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError> {
        sqlx::query(&self.sql.event_date_upsert)
            .bind(event_date_ids)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Upsert(e.to_string()))?;
        Ok(())
    }

    async fn prune_event_rows(&mut self, event_ids: &[i64]) -> Result<(), StorageError> {
        sqlx::query(&self.sql.event_prune)
            .bind(event_ids)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Prune(e.to_string()))?;
        Ok(())
    }

    async fn prune_event_date_rows(&mut self, event_date_ids: &[i64]) -> Result<(), StorageError> {
        sqlx::query(&self.sql.event_date_prune)
            .bind(event_date_ids)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Prune(e.to_string()))?;
        Ok(())
    }
}
