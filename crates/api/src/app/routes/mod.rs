use axum::{Router, routing::get};

pub mod event_dates;
pub mod events;
pub mod members;
pub mod permissions;
pub mod system;
pub mod venues;

/// Router for all admin (caller-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/permissions", get(permissions::list_capabilities))
        .merge(events::router())
        .merge(event_dates::router())
        .merge(venues::router())
        .merge(members::router())
}
