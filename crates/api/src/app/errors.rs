use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stagecraft_infra::Abort;

/// Map a transaction abort to an HTTP response.
///
/// The public body carries only [`Abort::public_message`]; the underlying
/// cause of a 500 goes to the log, never to the client.
pub fn abort_to_response(abort: Abort) -> axum::response::Response {
    let status =
        StatusCode::from_u16(abort.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = ?abort.cause(), "request aborted");
    }

    let code = match status {
        StatusCode::BAD_REQUEST => "validation_error",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        _ => "internal_error",
    };
    json_error(status, code, abort.public_message())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
