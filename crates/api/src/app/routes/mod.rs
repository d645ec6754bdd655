use axum::{
    Router,
    routing::{get, post},
};

pub mod events;
pub mod purchases;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/events", get(events::list_events))
        .route("/purchase", post(purchases::purchase))
}
