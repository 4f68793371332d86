//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use randchat_db::{DatabaseBackend, DatabaseConfig};
use randchat_signaling::{EngineConfig, SignalingConfig};
use serde::{Deserialize, Serialize};

/// Umgebungsvariable mit dem Pfad zur Konfigurationsdatei
pub const ENV_CONFIG: &str = "RANDCHAT_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub datenbank: DatenbankEinstellungen,
    pub logging: LoggingEinstellungen,
    pub signaling: SignalingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename fuer Logs
    pub name: String,
    /// Maximale gleichzeitige Verbindungen (WebSocket + TCP)
    pub max_clients: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "randchat".into(),
            max_clients: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// HTTP: WebSocket, Legacy-REST, Health, Metriken
    pub http_port: u16,
    /// TCP mit Laengen-Framing (native Clients); 0 = aus
    pub tcp_port: u16,
    /// CORS-Origins fuer die REST-Routen (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            http_port: 8080,
            tcp_port: 9987,
            cors_origins: vec![],
        }
    }
}

/// Datenbank-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    /// "memory" oder "sqlite"
    pub typ: String,
    pub url: String,
    pub max_verbindungen: u32,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            typ: "memory".into(),
            url: "sqlite://randchat.db".into(),
            max_verbindungen: 5,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Queue-Groessen und Frame-Limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    pub send_queue_groesse: usize,
    pub event_queue_groesse: usize,
    pub persistenz_queue_groesse: usize,
    pub max_frame_groesse: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
            event_queue_groesse: 1024,
            persistenz_queue_groesse: 1024,
            max_frame_groesse: randchat_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// `/metrics` und `/health` ausliefern
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.http_port)
    }

    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    pub fn datenbank_config(&self) -> anyhow::Result<DatabaseConfig> {
        let backend = match self.datenbank.typ.to_ascii_lowercase().as_str() {
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            anderer => anyhow::bail!("Unbekannter Datenbank-Typ '{anderer}'"),
        };
        Ok(DatabaseConfig {
            backend,
            url: self.datenbank.url.clone(),
            max_verbindungen: self.datenbank.max_verbindungen,
            ..Default::default()
        })
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_clients: self.server.max_clients,
            send_queue_groesse: self.signaling.send_queue_groesse,
            max_frame_groesse: self.signaling.max_frame_groesse,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            event_queue_groesse: self.signaling.event_queue_groesse,
            persistenz_queue_groesse: self.signaling.persistenz_queue_groesse,
        }
    }
}
