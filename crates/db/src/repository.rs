//! Repository-Trait fuer Benutzer-Datensaetze
//!
//! Der Signaling-Server feuert Verfuegbarkeits-Updates als Seiteneffekt ab,
//! ohne darauf zu warten. Der Trait ist daher ueber `async_trait` definiert,
//! damit die Futures `Send` sind und via `tokio::spawn` laufen koennen.

use async_trait::async_trait;
use randchat_core::types::UserId;
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::models::{AvailabilityUpdate, UserRecord, UserStatus};

/// Result-Alias fuer Datenbankoperationen
pub type DbResult<T> = Result<T, DbError>;

/// Unterstuetzte Backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// Fluechtig im Prozess, Standard
    #[default]
    Memory,
    Sqlite,
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackend::Memory => write!(f, "In-Memory"),
            DatabaseBackend::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Datenbankkonfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Ausgewaehltes Backend
    pub backend: DatabaseBackend,
    /// Verbindungs-URL (nur SQLite, z.B. "sqlite://randchat.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus bei SQLite aktiviert werden soll
    pub sqlite_wal: bool,
    /// Wartezeit auf gesperrte Datenbank, bevor ein Update fehlschlaegt
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: "sqlite://randchat.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Zugriff auf Benutzer-Datensaetze
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Legt einen neuen, aktiven und verfuegbaren Benutzer an
    async fn create_user(&self) -> DbResult<UserId>;

    /// Legt einen Benutzer mit vorgegebener Kennung an, falls er fehlt
    ///
    /// Browser-Clients bringen ihre Kennung selbst mit; existiert der
    /// Datensatz bereits, passiert nichts.
    async fn sicherstellen(&self, id: &UserId) -> DbResult<()>;

    /// Laedt einen Benutzer
    async fn get(&self, id: &UserId) -> DbResult<Option<UserRecord>>;

    /// Aendert die gesetzten Felder; `NichtGefunden` wenn die Kennung fehlt
    async fn aktualisieren(&self, id: &UserId, update: AvailabilityUpdate) -> DbResult<()>;

    /// Zufaelliger aktiver, verfuegbarer Benutzer ausser `excluding`
    async fn find_random_available_peer(&self, excluding: &UserId) -> DbResult<Option<UserId>>;

    /// Setzt beide Verfuegbarkeits-Flags
    async fn set_availability(
        &self,
        id: &UserId,
        active: bool,
        status: UserStatus,
    ) -> DbResult<()> {
        self.aktualisieren(id, AvailabilityUpdate::beide(active, status))
            .await
    }

    /// Anzahl verfuegbarer Benutzer (fuer Statistiken)
    async fn anzahl_verfuegbar(&self) -> DbResult<u64>;

    /// Prueft ob das Backend erreichbar ist
    async fn ping(&self) -> bool {
        true
    }
}
