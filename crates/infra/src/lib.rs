//! Infrastructure layer: Postgres-backed concretions of the authorization
//! and projection-refresh core.
//!
//! Everything here runs inside a transaction owned by [`tx::with_transaction`];
//! no module commits or retries on its own. Permission resolution, the
//! authorization gate, link-row lifecycle and the projection storage all take
//! the caller's connection and live or die with the caller's transaction.

pub mod ownership;
pub mod permissions;
pub mod projections;
pub mod tx;

pub use ownership::OwnershipLookup;
pub use permissions::gate::{AuthorizationGate, GatePass, check_all, check_any};
pub use permissions::link_store::{
    LinkStoreError, MemberLink, PermissionLinkStore, blocks_self_escalation,
};
pub use permissions::resolver::{PermissionResolver, ResolveError, ResourceScope};
pub use projections::postgres::{PostgresProjectionStorage, ProjectionSql};
pub use tx::{Abort, TxResult, with_transaction};
