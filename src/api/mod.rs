use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/lots/{lot_id}/prediction", get(handlers::get_prediction))
        .route("/api/lots/{lot_id}/timeline", get(handlers::get_timeline))
        .route("/api/rank", post(handlers::post_rank))
        .route("/api/departure", post(handlers::post_departure))
        .route("/api/health", get(handlers::get_health))
        .with_state(state)
}
