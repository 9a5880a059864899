pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/session/new", post(handlers::handle_new_session))
        .route("/api/session", get(handlers::handle_list_sessions))
        .route(
            "/api/session/:session_id",
            get(handlers::handle_get_session).post(handlers::handle_turn),
        )
        .with_state(state)
}
