//! Prometheus-kompatible Metriken fuer randchat
//!
//! Registrierte Metriken:
//! - `randchat_connected_users` – Gauge: Identifizierte Verbindungen
//! - `randchat_queue_length` – Gauge: Eintraege in der Warteschlange
//! - `randchat_active_sessions` – Gauge: Offene Sessions
//! - `randchat_matches_total` – Counter: Erfolgreiche Paarungen
//! - `randchat_relayed_messages_total` – Counter: Weitergeleitete Signaling-Nachrichten
//! - `randchat_dropped_messages_total` – Counter: Verworfene Nachrichten (grund)
//! - `randchat_persistence_failures_total` – Counter: Fehlgeschlagene Store-Updates
//! - `randchat_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `randchat_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle randchat-Prometheus-Metriken
#[derive(Clone)]
pub struct MatchMetrics {
    pub registry: Arc<Registry>,

    // Zustand der Vermittlung
    pub connected_users: IntGauge,
    pub queue_length: IntGauge,
    pub active_sessions: IntGauge,

    // Ereignisse
    pub matches_total: IntCounter,
    pub relayed_messages_total: IntCounter,
    pub dropped_messages_total: IntCounterVec,
    pub persistence_failures_total: IntCounter,

    // HTTP
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl MatchMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_users = IntGauge::with_opts(Opts::new(
            "randchat_connected_users",
            "Anzahl identifizierter Verbindungen",
        ))?;
        registry.register(Box::new(connected_users.clone()))?;

        let queue_length = IntGauge::with_opts(Opts::new(
            "randchat_queue_length",
            "Anzahl wartender Benutzer",
        ))?;
        registry.register(Box::new(queue_length.clone()))?;

        let active_sessions = IntGauge::with_opts(Opts::new(
            "randchat_active_sessions",
            "Anzahl offener Sessions",
        ))?;
        registry.register(Box::new(active_sessions.clone()))?;

        let matches_total = IntCounter::with_opts(Opts::new(
            "randchat_matches_total",
            "Gesamtanzahl erfolgreicher Paarungen",
        ))?;
        registry.register(Box::new(matches_total.clone()))?;

        let relayed_messages_total = IntCounter::with_opts(Opts::new(
            "randchat_relayed_messages_total",
            "Weitergeleitete Offer/Answer/ICE-Nachrichten",
        ))?;
        registry.register(Box::new(relayed_messages_total.clone()))?;

        let dropped_messages_total = IntCounterVec::new(
            Opts::new(
                "randchat_dropped_messages_total",
                "Verworfene Nachrichten nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(dropped_messages_total.clone()))?;

        let persistence_failures_total = IntCounter::with_opts(Opts::new(
            "randchat_persistence_failures_total",
            "Fehlgeschlagene Verfuegbarkeits-Updates im Benutzerspeicher",
        ))?;
        registry.register(Box::new(persistence_failures_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("randchat_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "randchat_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_users,
            queue_length,
            active_sessions,
            matches_total,
            relayed_messages_total,
            dropped_messages_total,
            persistence_failures_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt eine verworfene Nachricht
    pub fn verworfen(&self, grund: &str) {
        self.dropped_messages_total.with_label_values(&[grund]).inc();
    }

    /// Setzt die drei Zustands-Gauges auf einmal
    pub fn zustand_setzen(&self, verbunden: usize, wartend: usize, sessions: usize) {
        self.connected_users.set(verbunden as i64);
        self.queue_length.set(wartend as i64);
        self.active_sessions.set(sessions as i64);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: MatchMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<MatchMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
