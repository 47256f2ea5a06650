//! Admin event-date routes.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::delete,
};
use sqlx::PgConnection;

use stagecraft_auth::{Capability, PermissionSet};
use stagecraft_core::{EventDateId, EventId};
use stagecraft_infra::{
    Abort, GatePass, PostgresProjectionStorage, ResourceScope, TxResult, with_transaction,
};
use stagecraft_projection::EntityKind;

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/event-dates/:id", delete(delete_event_date))
}

/// DELETE /admin/event-dates/:id - Remove one occurrence of an event.
///
/// Ownership resolves through the date's parent event, so the permission is
/// checked against the organization that owns the event. Two refreshes run:
/// kind `event_date` on the deleted id prunes the date's own projection row,
/// and kind `event` on the parent keeps its row honest (next start date, or
/// pruning the row when the deleted occurrence was the last future one).
pub async fn delete_event_date(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let pool = services.pool.clone();
    let result = with_transaction(&pool, move |tx| {
        Box::pin(async move {
            let date = EventDateId::new(id);
            let organization = services
                .ownership
                .organization_of_event_date(&mut **tx, date)
                .await
                .map_err(Abort::internal)?
                .ok_or_else(|| Abort::not_found("event date"))?;

            let pass = services
                .gate
                .require_all(
                    &mut **tx,
                    caller.user_id(),
                    ResourceScope::Organization(organization),
                    PermissionSet::of(Capability::EditEvent),
                )
                .await?;

            let parent = delete_event_date_row(&mut **tx, &pass, &services.schema, date).await?;

            let mut storage = PostgresProjectionStorage::new(&mut **tx, &services.projection_sql);
            services
                .refresher
                .refresh(&mut storage, EntityKind::EventDate, &[date.get()])
                .await?;
            if let Some(event) = parent {
                services
                    .refresher
                    .refresh(&mut storage, EntityKind::Event, &[event.get()])
                    .await?;
            }
            Ok(())
        })
    })
    .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(abort) => errors::abort_to_response(abort),
    }
}

async fn delete_event_date_row(
    conn: &mut PgConnection,
    _pass: &GatePass,
    schema: &str,
    date: EventDateId,
) -> TxResult<Option<EventId>> {
    let sql = format!("DELETE FROM {schema}.event_date WHERE id = $1 RETURNING event_id");
    let event_id: Option<i64> = sqlx::query_scalar(&sql)
        .bind(date.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(Abort::internal)?;
    Ok(event_id.map(EventId::new))
}
