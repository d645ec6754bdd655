use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::{dto, errors, services::AppServices};

/// `POST /api/purchase`: reserve every line item or none of them.
pub async fn purchase(
    Extension(services): Extension<AppServices>,
    body: Result<Json<dto::PurchaseRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "undecodable purchase request");
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text());
        }
    };

    tracing::info!(line_items = body.items.len(), "processing purchase request");

    match services.reserve(body.items).await {
        Ok(reservation) => (StatusCode::OK, Json(dto::PurchaseResponse::from(&reservation))).into_response(),
        Err(e) => errors::reserve_error_to_response(e),
    }
}
