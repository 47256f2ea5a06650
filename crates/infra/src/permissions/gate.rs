//! The single chokepoint every mutating handler passes before touching rows.
//!
//! A successful check yields a [`GatePass`], a capability proof that the
//! mutation helpers demand by reference. The pass cannot be constructed
//! outside this module, so the mutation path is unreachable without a
//! verified check.

use sqlx::PgConnection;

use stagecraft_auth::PermissionSet;
use stagecraft_core::UserId;

use crate::permissions::resolver::{PermissionResolver, ResolveError, ResourceScope};
use crate::tx::{Abort, TxResult};

/// Proof that a permission check passed for one caller on one scope.
#[derive(Debug)]
pub struct GatePass {
    caller: UserId,
    scope: ResourceScope,
    granted: PermissionSet,
}

impl GatePass {
    pub fn caller(&self) -> UserId {
        self.caller
    }

    pub fn scope(&self) -> ResourceScope {
        self.scope
    }

    /// The caller's full effective set at check time, for follow-up
    /// decisions that need more than the required mask.
    pub fn granted(&self) -> PermissionSet {
        self.granted
    }
}

/// Evaluate a resolver result against a required mask, all bits required.
///
/// Denial is a 403 abort with a deliberately generic cause; a resolver
/// failure is a 500 abort. This is separated from the IO so policy tests
/// need no database.
pub fn check_all(
    resolved: Result<PermissionSet, ResolveError>,
    caller: UserId,
    scope: ResourceScope,
    mask: PermissionSet,
) -> TxResult<GatePass> {
    let granted = resolved.map_err(Abort::from)?;
    if granted.has_all(mask) {
        Ok(GatePass { caller, scope, granted })
    } else {
        Err(Abort::forbidden())
    }
}

/// Evaluate a resolver result requiring at least one bit of the mask.
pub fn check_any(
    resolved: Result<PermissionSet, ResolveError>,
    caller: UserId,
    scope: ResourceScope,
    mask: PermissionSet,
) -> TxResult<GatePass> {
    let granted = resolved.map_err(Abort::from)?;
    if granted.has_any(mask) {
        Ok(GatePass { caller, scope, granted })
    } else {
        Err(Abort::forbidden())
    }
}

/// Resolver plus policy evaluation, bound to the caller's transaction.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    resolver: PermissionResolver,
}

impl AuthorizationGate {
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    /// Require every bit of `mask` for `caller` on `scope`.
    pub async fn require_all(
        &self,
        conn: &mut PgConnection,
        caller: UserId,
        scope: ResourceScope,
        mask: PermissionSet,
    ) -> TxResult<GatePass> {
        let resolved = self.resolver.resolve(conn, caller, scope).await;
        check_all(resolved, caller, scope, mask)
    }

    /// Require at least one bit of `mask` for `caller` on `scope`.
    pub async fn require_any(
        &self,
        conn: &mut PgConnection,
        caller: UserId,
        scope: ResourceScope,
        mask: PermissionSet,
    ) -> TxResult<GatePass> {
        let resolved = self.resolver.resolve(conn, caller, scope).await;
        check_any(resolved, caller, scope, mask)
    }
}
