//! `stagecraft-auth`: the bitmask capability model.
//!
//! This crate is pure policy vocabulary: which capabilities exist, how they
//! map onto the 64-bit permission value persisted in link rows, and the set
//! algebra over that value. It is intentionally decoupled from HTTP and
//! storage; resolving a caller's effective set lives in the infra layer.

pub mod capability;
pub mod permission_set;

pub use capability::{Capability, Tier};
pub use permission_set::{BitRangeError, PermissionSet};
