use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stagecraft_core::UserId;

use crate::context::CallerContext;

/// Reads the verified caller identity forwarded by the auth gateway and makes
/// it available to handlers. Requests without a parsable `x-user-id` never
/// reach a handler.
pub async fn caller_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = extract_user_id(req.headers())?;

    req.extensions_mut().insert(CallerContext::new(user_id));

    Ok(next.run(req).await)
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let header = headers
        .get("x-user-id")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    header
        .trim()
        .parse::<UserId>()
        .map_err(|_| StatusCode::UNAUTHORIZED)
}
