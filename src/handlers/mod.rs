pub mod booking;
pub mod chat;
pub mod health;
pub mod recommend;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/intent", post(chat::intent))
        .route("/api/chat", post(chat::chat))
        .route("/api/recommendations", post(recommend::recommendations))
        .route("/api/availability", post(booking::availability))
        .route("/api/book", post(booking::book))
        .route("/api/cancel", post(booking::cancel))
        .route("/api/bookings", post(booking::bookings))
        .route("/api/bookings/:id", get(booking::booking))
        .route("/api/restaurants/:id", get(booking::restaurant))
        .with_state(state)
}
