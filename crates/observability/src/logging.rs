//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `RC_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: Wert aus der Konfiguration
//! - `RC_LOG_FORMAT`: Format (text/json), Standard: Wert aus der Konfiguration

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "RC_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "RC_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` / `format`. Ein zweiter
/// Aufruf (z.B. aus Tests) ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match effektives_format(format).as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Format nach Umgebungs-Override; unbekannte Werte fallen auf `text`
pub fn effektives_format(konfiguriert: &str) -> String {
    let format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| konfiguriert.to_string());
    if log_format_gueltig(&format) {
        format
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
