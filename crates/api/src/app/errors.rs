use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use ticketqueen_infra::{ReserveError, StoreError};

pub fn reserve_error_to_response(err: ReserveError) -> axum::response::Response {
    match err {
        ReserveError::MalformedRequest(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_request", msg),
        ReserveError::EventNotFound(event_id) => json_error_with(
            StatusCode::NOT_FOUND,
            "event_not_found",
            "Event not found",
            json!({ "event_id": event_id }),
        ),
        ReserveError::InsufficientInventory {
            event_id,
            available,
            requested,
        } => json_error_with(
            StatusCode::CONFLICT,
            "insufficient_inventory",
            format!("Not enough tickets available. Only {available} left"),
            json!({
                "event_id": event_id,
                "available": available,
                "requested": requested,
            }),
        ),
        ReserveError::StoreUnavailable(e) => store_error_to_response(e),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    json_error_with(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_unavailable",
        err.to_string(),
        json!({ "retryable": true }),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    json_error_with(status, code, message, Value::Null)
}

/// Like [`json_error`], with the fields of `extra` (an object) merged in.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    extra: Value,
) -> axum::response::Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    (status, axum::Json(body)).into_response()
}
