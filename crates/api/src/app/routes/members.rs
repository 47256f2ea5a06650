//! Admin member-permission routes.
//!
//! Strict escalation rules: only holders of manage-permissions may toggle
//! bits, and nobody may toggle the management bits on their own row.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::patch,
};
use serde::Deserialize;
use serde_json::json;

use stagecraft_auth::{Capability, PermissionSet};
use stagecraft_core::OrganizationId;
use stagecraft_infra::{
    Abort, LinkStoreError, ResourceScope, blocks_self_escalation, with_transaction,
};

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetPermissionBitRequest {
    pub bit: u8,
    pub enabled: bool,
}

pub fn router() -> Router {
    Router::new().route(
        "/organizations/:org_id/members/:link_id/permission",
        patch(set_member_permission),
    )
}

/// PATCH /admin/organizations/:org_id/members/:link_id/permission
///
/// Flips one permission bit on a membership link and returns the resulting
/// set. The link must belong to the addressed organization; a link id from
/// another organization reads as not found rather than leaking its existence.
pub async fn set_member_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path((org_id, link_id)): Path<(i64, i64)>,
    Json(body): Json<SetPermissionBitRequest>,
) -> axum::response::Response {
    // Range check before any transaction work.
    let mut scratch = PermissionSet::EMPTY;
    if scratch.set_bit(body.bit).is_err() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("permission bit {} is out of range", body.bit),
        );
    }

    let pool = services.pool.clone();
    let result = with_transaction(&pool, move |tx| {
        Box::pin(async move {
            let organization = OrganizationId::new(org_id);
            let _pass = services
                .gate
                .require_all(
                    &mut **tx,
                    caller.user_id(),
                    ResourceScope::Organization(organization),
                    PermissionSet::of(Capability::ManagePermissions),
                )
                .await?;

            let link = services
                .links
                .member_link(&mut **tx, link_id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| Abort::not_found("membership link"))?;
            if link.organization_id != organization {
                return Err(Abort::not_found("membership link"));
            }

            if blocks_self_escalation(caller.user_id(), &link, body.bit) {
                return Err(Abort::forbidden());
            }

            services
                .links
                .set_member_bit(&mut **tx, link_id, body.bit, body.enabled)
                .await
                .map_err(store_error)?
                .ok_or_else(|| Abort::not_found("membership link"))
        })
    })
    .await;

    match result {
        Ok(permissions) => Json(json!({ "permissions": permissions.to_stored() })).into_response(),
        Err(abort) => errors::abort_to_response(abort),
    }
}

fn store_error(err: LinkStoreError) -> Abort {
    match err {
        LinkStoreError::Bit(e) => Abort::bad_request(e.to_string()),
        LinkStoreError::Query(e) => Abort::internal(e),
    }
}
