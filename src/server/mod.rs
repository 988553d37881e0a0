pub mod routes;
pub mod ws;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/price", post(routes::post_price))
        .route("/api/heatmap", post(routes::post_heatmap))
        .route("/api/pnl", get(routes::get_pnl))
        .route("/api/history", get(routes::get_history))
        .route("/api/state", get(routes::get_state))
        .route("/api/counters", get(routes::get_counters))
        .route("/ws", get(ws::ws_handler))
        .fallback_service(
            tower_http::services::ServeDir::new("dashboard/dist")
                .fallback(tower_http::services::ServeFile::new("dashboard/dist/index.html")),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
