//! Link-row lifecycle: creation grants, atomic bit toggles, removal.
//!
//! A link row associates a user with a resource and a 64-bit permission
//! value. The uniqueness constraint on (organization_id, user_id) plus the
//! OR-merging upsert guarantee that duplicate rows for the same pair never
//! exist; single capabilities are enabled or disabled with an atomic bitwise
//! update that leaves every other bit untouched.

use sqlx::PgConnection;
use thiserror::Error;
use tracing::instrument;

use stagecraft_auth::{BitRangeError, Capability, PermissionSet};
use stagecraft_core::{OrganizationId, UserId};

/// One user↔organization link row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLink {
    pub link_id: i64,
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub permissions: PermissionSet,
    pub has_joined: bool,
}

#[derive(Debug, Error)]
pub enum LinkStoreError {
    #[error(transparent)]
    Bit(#[from] BitRangeError),

    #[error("link store query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Schema-bound statements over the organization member link table.
#[derive(Debug, Clone)]
pub struct PermissionLinkStore {
    grant_admin_sql: String,
    member_link_sql: String,
    set_bit_sql: String,
    clear_bit_sql: String,
    remove_sql: String,
}

impl PermissionLinkStore {
    pub fn for_schema(schema: &str) -> Self {
        Self {
            grant_admin_sql: format!(
                "INSERT INTO {schema}.organization_member_link \
                   (organization_id, user_id, permissions, has_joined) \
                 VALUES ($1, $2, $3, TRUE) \
                 ON CONFLICT (organization_id, user_id) DO UPDATE SET \
                   permissions = organization_member_link.permissions | EXCLUDED.permissions, \
                   has_joined = TRUE, \
                   modified_at = NOW()"
            ),
            member_link_sql: format!(
                "SELECT id, organization_id, user_id, permissions, has_joined \
                 FROM {schema}.organization_member_link WHERE id = $1"
            ),
            set_bit_sql: format!(
                "UPDATE {schema}.organization_member_link \
                 SET permissions = permissions | (1::BIGINT << $2), modified_at = NOW() \
                 WHERE id = $1 RETURNING permissions"
            ),
            clear_bit_sql: format!(
                "UPDATE {schema}.organization_member_link \
                 SET permissions = permissions & ~(1::BIGINT << $2), modified_at = NOW() \
                 WHERE id = $1 RETURNING permissions"
            ),
            remove_sql: format!("DELETE FROM {schema}.organization_member_link WHERE id = $1"),
        }
    }

    /// Creator grant: the user who creates an organization gets the Admin
    /// preset. Merges into an existing row instead of duplicating it.
    #[instrument(skip(self, conn))]
    pub async fn grant_organization_admin(
        &self,
        conn: &mut PgConnection,
        user: UserId,
        organization: OrganizationId,
    ) -> Result<(), LinkStoreError> {
        sqlx::query(&self.grant_admin_sql)
            .bind(organization.get())
            .bind(user.get())
            .bind(PermissionSet::ADMIN.to_stored())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn member_link(
        &self,
        conn: &mut PgConnection,
        link_id: i64,
    ) -> Result<Option<MemberLink>, LinkStoreError> {
        let row: Option<(i64, i64, i64, i64, bool)> = sqlx::query_as(&self.member_link_sql)
            .bind(link_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|(id, org, user, permissions, has_joined)| MemberLink {
            link_id: id,
            organization_id: OrganizationId::new(org),
            user_id: UserId::new(user),
            permissions: PermissionSet::from_stored(permissions),
            has_joined,
        }))
    }

    /// Atomically flip one permission bit on a link row, returning the
    /// updated set, or `None` when the row does not exist. The bit index is
    /// validated before any SQL runs.
    #[instrument(skip(self, conn))]
    pub async fn set_member_bit(
        &self,
        conn: &mut PgConnection,
        link_id: i64,
        bit: u8,
        enabled: bool,
    ) -> Result<Option<PermissionSet>, LinkStoreError> {
        // Reuse the algebra's range guard so the SQL shift can never wrap.
        let mut scratch = PermissionSet::EMPTY;
        scratch.set_bit(bit)?;

        let sql = if enabled { &self.set_bit_sql } else { &self.clear_bit_sql };
        let updated: Option<i64> = sqlx::query_scalar(sql)
            .bind(link_id)
            .bind(i32::from(bit))
            .fetch_optional(&mut *conn)
            .await?;
        Ok(updated.map(PermissionSet::from_stored))
    }

    /// Delete a membership link entirely.
    #[instrument(skip(self, conn))]
    pub async fn remove_member(
        &self,
        conn: &mut PgConnection,
        link_id: i64,
    ) -> Result<bool, LinkStoreError> {
        let result = sqlx::query(&self.remove_sql)
            .bind(link_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// A caller may never toggle their own manage-permissions or manage-team
/// bits; everything else on their own row is fair game.
pub fn blocks_self_escalation(caller: UserId, link: &MemberLink, bit: u8) -> bool {
    link.user_id == caller
        && (bit == Capability::ManagePermissions.bit() || bit == Capability::ManageTeam.bit())
}
