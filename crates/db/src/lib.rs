//! randchat-db – Benutzer-Datensaetze
//!
//! Haelt pro Benutzer zwei Flags (`active`, `status`), die der alte
//! Polling-Client ueber REST abfragt und der Signaling-Server bei
//! Paarung und Trennung nachfuehrt. Zwei Backends stehen hinter dem
//! [`UserStore`]-Trait: fluechtig im Speicher (Standard) und SQLite.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod sqlite;

use std::sync::Arc;

pub use error::DbError;
pub use memory::MemoryStore;
pub use models::{AvailabilityUpdate, UserRecord, UserStatus};
pub use repository::{DatabaseBackend, DatabaseConfig, DbResult, UserStore};
pub use sqlite::SqliteDb;

/// Oeffnet das konfigurierte Backend
pub async fn oeffnen(config: &DatabaseConfig) -> DbResult<Arc<dyn UserStore>> {
    match config.backend {
        DatabaseBackend::Memory => {
            tracing::info!("In-Memory-Benutzerspeicher aktiv");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseBackend::Sqlite => Ok(Arc::new(SqliteDb::oeffnen(config).await?)),
    }
}
