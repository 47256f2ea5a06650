//! Admin event routes.
//!
//! Mutations run inside one transaction together with the projection refresh:
//! either the normalized write and every affected read-model row commit, or
//! nothing does.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::patch,
};
use serde::Deserialize;
use sqlx::PgConnection;

use stagecraft_auth::{Capability, PermissionSet};
use stagecraft_core::EventId;
use stagecraft_infra::{
    Abort, GatePass, PostgresProjectionStorage, ResourceScope, TxResult, with_transaction,
};
use stagecraft_projection::EntityKind;

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub release_status_id: Option<i32>,
}

impl UpdateEventRequest {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.description.is_none()
            && self.summary.is_none()
            && self.release_status_id.is_none()
    }
}

pub fn router() -> Router {
    Router::new().route("/events/:id", patch(update_event))
}

/// PATCH /admin/events/:id - Update an event and refresh its projections.
pub async fn update_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateEventRequest>,
) -> axum::response::Response {
    if body.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "no fields to update",
        );
    }

    let pool = services.pool.clone();
    let result = with_transaction(&pool, move |tx| {
        Box::pin(async move {
            let event = EventId::new(id);
            let organization = services
                .ownership
                .organization_of_event(&mut **tx, event)
                .await
                .map_err(Abort::internal)?
                .ok_or_else(|| Abort::not_found("event"))?;

            let pass = services
                .gate
                .require_all(
                    &mut **tx,
                    caller.user_id(),
                    ResourceScope::Organization(organization),
                    PermissionSet::of(Capability::EditEvent),
                )
                .await?;

            update_event_row(&mut **tx, &pass, &services.schema, event, &body).await?;

            let mut storage = PostgresProjectionStorage::new(&mut **tx, &services.projection_sql);
            services
                .refresher
                .refresh(&mut storage, EntityKind::Event, &[event.get()])
                .await?;
            Ok(())
        })
    })
    .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(abort) => errors::abort_to_response(abort),
    }
}

/// Apply the partial update. Only fields present in the request make it into
/// the SET list, so absent fields are left untouched rather than nulled.
async fn update_event_row(
    conn: &mut PgConnection,
    _pass: &GatePass,
    schema: &str,
    event: EventId,
    body: &UpdateEventRequest,
) -> TxResult<()> {
    let mut sets: Vec<String> = Vec::new();
    let mut idx = 1;
    for present in [
        body.title.is_some().then_some("title"),
        body.subtitle.is_some().then_some("subtitle"),
        body.description.is_some().then_some("description"),
        body.summary.is_some().then_some("summary"),
        body.release_status_id.is_some().then_some("release_status_id"),
    ]
    .into_iter()
    .flatten()
    {
        sets.push(format!("{present} = ${idx}"));
        idx += 1;
    }

    let sql = format!(
        "UPDATE {schema}.event SET {} WHERE id = ${idx}",
        sets.join(", ")
    );
    let mut query = sqlx::query(&sql);
    if let Some(v) = &body.title {
        query = query.bind(v);
    }
    if let Some(v) = &body.subtitle {
        query = query.bind(v);
    }
    if let Some(v) = &body.description {
        query = query.bind(v);
    }
    if let Some(v) = &body.summary {
        query = query.bind(v);
    }
    if let Some(v) = body.release_status_id {
        query = query.bind(v);
    }
    query
        .bind(event.get())
        .execute(&mut *conn)
        .await
        .map_err(Abort::internal)?;
    Ok(())
}
