//! HTTP-Routen des Servers

pub mod legacy;
pub mod stats;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::Router;
use randchat_db::UserStore;
use randchat_observability::{
    observability_router, request_timing_layer, timing_middleware, HealthState, MatchMetrics,
};
use randchat_signaling::{ws_router, SignalingState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;

/// Gesamter HTTP-Router: `/ws`, Legacy-REST, `/api/stats`, Health, Metriken
pub fn app_router(
    config: &ServerConfig,
    signaling: Arc<SignalingState>,
    store: Arc<dyn UserStore>,
    metriken: MatchMetrics,
    health: HealthState,
) -> Router {
    let mut app = Router::new()
        .merge(ws_router(Arc::clone(&signaling)))
        .merge(legacy::legacy_router(store))
        .merge(stats::stats_router(signaling));

    if config.observability.aktiviert {
        app = app.merge(observability_router(metriken.clone(), health));
    }

    app.layer(middleware::from_fn_with_state(metriken, timing_middleware))
        .layer(request_timing_layer())
        .layer(cors_layer(&config.netzwerk.cors_origins))
}

/// Leere Liste erlaubt alle Origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}
