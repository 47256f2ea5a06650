//! Admin venue routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgConnection;

use stagecraft_auth::{Capability, PermissionSet};
use stagecraft_core::{OrganizationId, VenueId};
use stagecraft_infra::{
    Abort, GatePass, PostgresProjectionStorage, ResourceScope, TxResult, with_transaction,
};
use stagecraft_projection::EntityKind;

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVenueRequest {
    pub name: String,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country_code: Option<String>,
}

pub fn router() -> Router {
    Router::new().route("/organizations/:id/venues", post(create_venue))
}

/// POST /admin/organizations/:id/venues - Create a venue under an organization.
pub async fn create_venue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<i64>,
    Json(body): Json<CreateVenueRequest>,
) -> axum::response::Response {
    if body.name.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "name is required");
    }

    let pool = services.pool.clone();
    let result = with_transaction(&pool, move |tx| {
        Box::pin(async move {
            let organization = OrganizationId::new(id);
            let pass = services
                .gate
                .require_all(
                    &mut **tx,
                    caller.user_id(),
                    ResourceScope::Organization(organization),
                    PermissionSet::of(Capability::AddVenue),
                )
                .await?;

            let venue =
                insert_venue_row(&mut **tx, &pass, &services.schema, organization, &body).await?;

            let mut storage = PostgresProjectionStorage::new(&mut **tx, &services.projection_sql);
            services
                .refresher
                .refresh(&mut storage, EntityKind::Venue, &[venue.get()])
                .await?;
            Ok(venue)
        })
    })
    .await;

    match result {
        Ok(venue) => (StatusCode::CREATED, Json(json!({ "id": venue.get() }))).into_response(),
        Err(abort) => errors::abort_to_response(abort),
    }
}

async fn insert_venue_row(
    conn: &mut PgConnection,
    _pass: &GatePass,
    schema: &str,
    organization: OrganizationId,
    body: &CreateVenueRequest,
) -> TxResult<VenueId> {
    let sql = format!(
        "INSERT INTO {schema}.venue (organization_id, name, street, postal_code, city, country_code) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"
    );
    let id: i64 = sqlx::query_scalar(&sql)
        .bind(organization.get())
        .bind(&body.name)
        .bind(&body.street)
        .bind(&body.postal_code)
        .bind(&body.city)
        .bind(&body.country_code)
        .fetch_one(&mut *conn)
        .await
        .map_err(Abort::internal)?;
    Ok(VenueId::new(id))
}
