//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: shared state (pool, gate, refresher, prepared SQL)
//! - `routes/`: admin routes, one file per resource
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use sqlx::PgPool;

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(pool: PgPool, schema: &str) -> Router {
    let services = Arc::new(services::AppServices::build(pool, schema));

    // Admin routes: require a verified caller identity.
    let admin = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::caller_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/admin", admin)
}
