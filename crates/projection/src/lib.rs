//! `stagecraft-projection`: the dependency-driven projection refresh engine.
//!
//! Admin mutations touch normalized rows; the public read path serves two
//! denormalized projection tables (one row per event, one per event date).
//! This crate decides, for a change to one source entity kind, which
//! projection rows are affected and drives their recomputation, always
//! inside the caller's transaction, so the normalized and denormalized views
//! commit or roll back together.
//!
//! The crate is storage-agnostic: [`ProjectionRefresher`] orchestrates over
//! the [`ProjectionStorage`] trait. The Postgres implementation lives in
//! `stagecraft-infra`; an in-memory implementation for tests and dev lives
//! in [`memory`].

pub mod dependency;
pub mod kind;
pub mod memory;
pub mod refresher;

pub use dependency::{DependencyEntry, DependencyMap};
pub use kind::EntityKind;
pub use refresher::{ProjectionRefresher, ProjectionStorage, RefreshError, RefreshOutcome, StorageError};
