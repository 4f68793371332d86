//! `GET /api/stats` – Momentaufnahme aus der Engine

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use randchat_signaling::SignalingState;
use serde_json::json;
use std::sync::Arc;

pub fn stats_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .with_state(state)
}

/// Laeuft ueber die Engine-Queue, sieht also alle vorher eingegangenen Events
pub async fn get_stats(State(state): State<Arc<SignalingState>>) -> Response {
    match state.engine.statistik().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            tracing::warn!(fehler = %e, "Statistik nicht verfuegbar");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "message": "engine unavailable" })),
            )
                .into_response()
        }
    }
}
