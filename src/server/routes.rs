use super::handlers::{health_handler, history_handler, snapshot_handler};
use super::ws::ws_handler;
use super::AppState;
use axum::{routing::get, Router};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/snapshot", get(snapshot_handler))
        .route("/history", get(history_handler))
}
