//! Postgres-backed integration tests.
//!
//! Ignored by default; run with a scratch database:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/stagecraft_test cargo test -p stagecraft-infra -- --ignored
//! ```
//!
//! Each test owns a throwaway schema so runs are repeatable.

use sqlx::{Executor, PgPool};

use stagecraft_auth::{Capability, PermissionSet};
use stagecraft_core::{OrganizationId, UserId, VenueId};
use stagecraft_infra::{
    AuthorizationGate, PermissionLinkStore, PermissionResolver, PostgresProjectionStorage,
    ProjectionSql, ResourceScope, with_transaction,
};
use stagecraft_projection::{DependencyEntry, DependencyMap, EntityKind, ProjectionRefresher};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    PgPool::connect(&url).await.expect("connect")
}

async fn setup_schema(pool: &PgPool, schema: &str) {
    pool.execute(format!("DROP SCHEMA IF EXISTS {schema} CASCADE").as_str())
        .await
        .unwrap();
    pool.execute(format!("CREATE SCHEMA {schema}").as_str()).await.unwrap();

    let ddl = format!(
        r#"
CREATE TABLE {schema}.organization (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    website_url TEXT
);
CREATE TABLE {schema}.venue (
    id BIGINT PRIMARY KEY,
    organization_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    street TEXT,
    postal_code TEXT,
    city TEXT,
    country_code TEXT
);
CREATE TABLE {schema}.space (
    id BIGINT PRIMARY KEY,
    venue_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    total_capacity INT
);
CREATE TABLE {schema}.event_location (
    id BIGINT PRIMARY KEY,
    name TEXT,
    street TEXT,
    postal_code TEXT,
    city TEXT,
    country_code TEXT
);
CREATE TABLE {schema}.event (
    id BIGINT PRIMARY KEY,
    organization_id BIGINT NOT NULL,
    venue_id BIGINT,
    space_id BIGINT,
    location_id BIGINT,
    release_status_id INT,
    title TEXT NOT NULL,
    subtitle TEXT,
    description TEXT,
    summary TEXT,
    image_id BIGINT,
    price_type_id INT,
    currency_code TEXT,
    min_price NUMERIC,
    max_price NUMERIC,
    search_text TEXT
);
CREATE TABLE {schema}.event_type_link (
    event_id BIGINT NOT NULL,
    type_id INT NOT NULL,
    genre_id INT
);
CREATE TABLE {schema}.event_date (
    id BIGINT PRIMARY KEY,
    event_id BIGINT NOT NULL,
    venue_id BIGINT,
    space_id BIGINT,
    start_date DATE NOT NULL,
    start_time TIME,
    end_date DATE,
    end_time TIME,
    all_day BOOLEAN NOT NULL DEFAULT FALSE,
    ticket_link TEXT,
    availability_status_id INT
);
CREATE TABLE {schema}.organization_member_link (
    id BIGSERIAL PRIMARY KEY,
    organization_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    permissions BIGINT NOT NULL DEFAULT 0,
    has_joined BOOLEAN NOT NULL DEFAULT FALSE,
    modified_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (organization_id, user_id)
);
CREATE TABLE {schema}.venue_member_link (
    id BIGSERIAL PRIMARY KEY,
    venue_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    permissions BIGINT NOT NULL DEFAULT 0,
    UNIQUE (venue_id, user_id)
);
CREATE TABLE {schema}.event_projection (
    event_id BIGINT PRIMARY KEY,
    organization_id BIGINT,
    venue_id BIGINT,
    space_id BIGINT,
    release_status_id INT,
    title TEXT,
    subtitle TEXT,
    description TEXT,
    summary TEXT,
    image_id BIGINT,
    types JSONB,
    price_type_id INT,
    currency_code TEXT,
    min_price NUMERIC,
    max_price NUMERIC,
    search_text TEXT,
    organization_name TEXT,
    organization_website_url TEXT,
    venue_name TEXT,
    venue_street TEXT,
    venue_postal_code TEXT,
    venue_city TEXT,
    venue_country_code TEXT,
    space_name TEXT,
    space_total_capacity INT,
    next_start_date DATE,
    created_at TIMESTAMPTZ NOT NULL,
    modified_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE {schema}.event_date_projection (
    event_date_id BIGINT PRIMARY KEY,
    event_id BIGINT,
    venue_id BIGINT,
    space_id BIGINT,
    venue_name TEXT,
    venue_street TEXT,
    venue_postal_code TEXT,
    venue_city TEXT,
    venue_country_code TEXT,
    space_name TEXT,
    space_total_capacity INT,
    start_date DATE,
    start_time TIME,
    end_date DATE,
    end_time TIME,
    all_day BOOLEAN,
    ticket_link TEXT,
    availability_status_id INT,
    created_at TIMESTAMPTZ NOT NULL,
    modified_at TIMESTAMPTZ NOT NULL
);
"#
    );
    for statement in ddl.split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            pool.execute(statement).await.unwrap();
        }
    }
}

async fn seed_event_42(pool: &PgPool, schema: &str) {
    let seed = format!(
        r#"
INSERT INTO {schema}.organization (id, name, website_url) VALUES (10, 'Kulturhaus Nord', 'https://kulturhaus.example');
INSERT INTO {schema}.venue (id, organization_id, name, street, postal_code, city, country_code) VALUES (100, 10, 'Grosse Halle', 'Hafenweg 3', '24937', 'Flensburg', 'DE');
INSERT INTO {schema}.space (id, venue_id, name, total_capacity) VALUES (1000, 100, 'Saal A', 350);
INSERT INTO {schema}.event (id, organization_id, venue_id, space_id, title, search_text) VALUES (42, 10, 100, 1000, 'Jazz im Saal', 'jazz saal');
INSERT INTO {schema}.event_date (id, event_id, start_date) VALUES (421, 42, CURRENT_DATE + 7);
INSERT INTO {schema}.event_date (id, event_id, start_date) VALUES (422, 42, CURRENT_DATE - 30)
"#
    );
    for statement in seed.split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            pool.execute(statement).await.unwrap();
        }
    }
}

#[tokio::test]
#[ignore]
async fn resolver_unions_links_and_falls_back_to_the_organization() {
    let pool = pool().await;
    let schema = "stagecraft_it_resolver";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    let resolver = PermissionResolver::for_schema(schema);
    let store = PermissionLinkStore::for_schema(schema);
    let user = UserId::new(7);
    let org = OrganizationId::new(10);

    let mut conn = pool.acquire().await.unwrap();

    // No link rows at all: the empty set, not an error.
    let none = resolver.organization_permissions(&mut conn, user, org).await.unwrap();
    assert_eq!(none, PermissionSet::EMPTY);

    store.grant_organization_admin(&mut conn, user, org).await.unwrap();
    let direct = resolver.organization_permissions(&mut conn, user, org).await.unwrap();
    assert_eq!(direct, PermissionSet::ADMIN);

    // Granting twice must merge, not duplicate.
    store.grant_organization_admin(&mut conn, user, org).await.unwrap();
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {schema}.organization_member_link WHERE user_id = $1"
    ))
    .bind(user.get())
    .fetch_one(&mut *conn)
    .await
    .unwrap();
    assert_eq!(count, 1);

    // No venue-specific link: the organization link cascades to the venue.
    let venue = resolver
        .effective_venue_permissions(&mut conn, user, VenueId::new(100))
        .await
        .unwrap();
    assert_eq!(venue, PermissionSet::ADMIN);

    // A venue-specific link overrides the cascade.
    sqlx::query(&format!(
        "INSERT INTO {schema}.venue_member_link (venue_id, user_id, permissions) VALUES (100, $1, $2)"
    ))
    .bind(user.get())
    .bind(PermissionSet::of(Capability::EditVenue).to_stored())
    .execute(&mut *conn)
    .await
    .unwrap();
    let overridden = resolver
        .effective_venue_permissions(&mut conn, user, VenueId::new(100))
        .await
        .unwrap();
    assert_eq!(overridden, PermissionSet::of(Capability::EditVenue));
}

#[tokio::test]
#[ignore]
async fn title_mutation_plus_refresh_updates_both_projections() {
    let pool = pool().await;
    let schema = "stagecraft_it_refresh";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    // The closure's future may only capture owned data, so each call site
    // moves its statements in.
    let refresher = ProjectionRefresher::new(DependencyMap::for_schema(schema));
    let sql = ProjectionSql::for_schema(schema);
    let update = format!("UPDATE {schema}.event SET title = $1 WHERE id = $2");

    with_transaction(&pool, move |tx| {
        Box::pin(async move {
            sqlx::query(&update)
                .bind("Jazz im Saal — Sommerspecial")
                .bind(42i64)
                .execute(&mut **tx)
                .await
                .map_err(stagecraft_infra::Abort::internal)?;
            let mut storage = PostgresProjectionStorage::new(&mut **tx, &sql);
            refresher
                .refresh(&mut storage, EntityKind::Event, &[42])
                .await
                .map_err(stagecraft_infra::Abort::from)?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let (title, venue_name): (String, Option<String>) = sqlx::query_as(&format!(
        "SELECT title, venue_name FROM {schema}.event_projection WHERE event_id = 42"
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(title, "Jazz im Saal — Sommerspecial");
    assert_eq!(venue_name.as_deref(), Some("Grosse Halle"));

    // Only the future occurrence projects; the past one is excluded.
    let date_ids: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT event_date_id FROM {schema}.event_date_projection ORDER BY event_date_id"
    ))
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(date_ids, vec![421]);
}

#[tokio::test]
#[ignore]
async fn refresh_twice_changes_nothing_but_the_timestamp() {
    let pool = pool().await;
    let schema = "stagecraft_it_idem";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    for _ in 0..2 {
        let refresher = ProjectionRefresher::new(DependencyMap::for_schema(schema));
        let sql = ProjectionSql::for_schema(schema);
        with_transaction(&pool, move |tx| {
            Box::pin(async move {
                let mut storage = PostgresProjectionStorage::new(&mut **tx, &sql);
                refresher
                    .refresh(&mut storage, EntityKind::Event, &[42])
                    .await
                    .map_err(stagecraft_infra::Abort::from)?;
                Ok(())
            })
        })
        .await
        .unwrap();
    }

    // One row, created_at untouched by the second pass.
    let (count, stable): (i64, bool) = sqlx::query_as(&format!(
        "SELECT COUNT(*), BOOL_AND(created_at <= modified_at) FROM {schema}.event_projection"
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert!(stable);
}

#[tokio::test]
#[ignore]
async fn failed_refresh_rolls_back_the_mutation() {
    let pool = pool().await;
    let schema = "stagecraft_it_atomic";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    // A map whose fan-out query is invalid SQL forces the refresh to fail
    // after the mutation has already run.
    let broken = ProjectionRefresher::new(DependencyMap::from_entries([(
        EntityKind::Event,
        DependencyEntry::new(Some("SELECT id FROM missing_table"), None::<String>),
    )]));
    let sql = ProjectionSql::for_schema(schema);
    let update = format!("UPDATE {schema}.event SET title = 'verloren' WHERE id = 42");

    let err = with_transaction(&pool, move |tx| {
        Box::pin(async move {
            sqlx::query(&update)
                .execute(&mut **tx)
                .await
                .map_err(stagecraft_infra::Abort::internal)?;
            let mut storage = PostgresProjectionStorage::new(&mut **tx, &sql);
            broken
                .refresh(&mut storage, EntityKind::Event, &[42])
                .await
                .map_err(stagecraft_infra::Abort::from)?;
            Ok(())
        })
    })
    .await
    .unwrap_err();
    assert_eq!(err.status(), 500);

    // The normalized mutation must be gone with the refresh.
    let title: String =
        sqlx::query_scalar(&format!("SELECT title FROM {schema}.event WHERE id = 42"))
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(title, "Jazz im Saal");
}

#[tokio::test]
#[ignore]
async fn gate_denies_across_tiers_against_real_link_rows() {
    let pool = pool().await;
    let schema = "stagecraft_it_gate";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    let gate = AuthorizationGate::new(PermissionResolver::for_schema(schema));
    let user = UserId::new(7);
    let org = OrganizationId::new(10);

    let mut conn = pool.acquire().await.unwrap();
    sqlx::query(&format!(
        "INSERT INTO {schema}.organization_member_link (organization_id, user_id, permissions, has_joined) \
         VALUES ($1, $2, $3, TRUE)"
    ))
    .bind(org.get())
    .bind(user.get())
    .bind(PermissionSet::BOOKER.to_stored())
    .execute(&mut *conn)
    .await
    .unwrap();

    let pass = gate
        .require_all(
            &mut conn,
            user,
            ResourceScope::Organization(org),
            PermissionSet::of(Capability::EditEvent),
        )
        .await
        .unwrap();
    assert_eq!(pass.granted(), PermissionSet::BOOKER);

    let denied = gate
        .require_all(
            &mut conn,
            user,
            ResourceScope::Organization(org),
            PermissionSet::of(Capability::ManageTeam),
        )
        .await
        .unwrap_err();
    assert_eq!(denied.status(), 403);
}

async fn refresh_once(pool: &PgPool, schema: &str, kind: EntityKind, ids: Vec<i64>) {
    let refresher = ProjectionRefresher::new(DependencyMap::for_schema(schema));
    let sql = ProjectionSql::for_schema(schema);
    with_transaction(pool, move |tx| {
        Box::pin(async move {
            let mut storage = PostgresProjectionStorage::new(&mut **tx, &sql);
            refresher
                .refresh(&mut storage, kind, &ids)
                .await
                .map_err(stagecraft_infra::Abort::from)?;
            Ok(())
        })
    })
    .await
    .unwrap();
}

async fn event_projection_count(pool: &PgPool, schema: &str, event_id: i64) -> i64 {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {schema}.event_projection WHERE event_id = $1"
    ))
    .bind(event_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore]
async fn deleted_event_with_lingering_dates_is_pruned() {
    let pool = pool().await;
    let schema = "stagecraft_it_prune";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    refresh_once(&pool, schema, EntityKind::Event, vec![42]).await;
    assert_eq!(event_projection_count(&pool, schema, 42).await, 1);

    // The source event vanishes but its future-dated occurrence stays
    // behind (the projection tables carry no FK cascade).
    sqlx::query(&format!("DELETE FROM {schema}.event WHERE id = 42"))
        .execute(&pool)
        .await
        .unwrap();

    refresh_once(&pool, schema, EntityKind::Event, vec![42]).await;
    assert_eq!(event_projection_count(&pool, schema, 42).await, 0);
}

#[tokio::test]
#[ignore]
async fn deleting_the_last_occurrence_prunes_both_projections() {
    let pool = pool().await;
    let schema = "stagecraft_it_last_date";
    setup_schema(&pool, schema).await;
    seed_event_42(&pool, schema).await;

    refresh_once(&pool, schema, EntityKind::Event, vec![42]).await;
    assert_eq!(event_projection_count(&pool, schema, 42).await, 1);

    // Date 421 is event 42's only future occurrence. Delete it and run the
    // two refreshes a delete handler issues: the date's own row and the
    // parent event's row must both go.
    let parent: i64 = sqlx::query_scalar(&format!(
        "DELETE FROM {schema}.event_date WHERE id = 421 RETURNING event_id"
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(parent, 42);

    refresh_once(&pool, schema, EntityKind::EventDate, vec![421]).await;
    refresh_once(&pool, schema, EntityKind::Event, vec![parent]).await;

    let date_rows: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {schema}.event_date_projection WHERE event_date_id = 421"
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(date_rows, 0);
    assert_eq!(event_projection_count(&pool, schema, 42).await, 0);
}
