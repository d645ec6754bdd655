use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::{dto, errors, services::AppServices};

/// `GET /api/events`: every event, soonest first.
pub async fn list_events(Extension(services): Extension<AppServices>) -> axum::response::Response {
    match services.list_events().await {
        Ok(events) => Json(events.iter().map(dto::EventResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list events");
            errors::store_error_to_response(e)
        }
    }
}
