//! SQLite-Pool fuer die Benutzer-Tabelle
//!
//! Der Polling-Pfad liest sehr viel haeufiger als die Engine schreibt.
//! WAL erlaubt Lesen parallel zum Schreiben, `busy_timeout` faengt die
//! seltenen Schreibkonflikte ab, statt sofort mit `SQLITE_BUSY` zu scheitern.
//!
//! Beim Oeffnen einer bestehenden Datei werden alle Benutzer auf inaktiv
//! gesetzt: nach einem Neustart gibt es keine offenen Verbindungen mehr,
//! und der Polling-Pfad darf keine Geister als Partner vorschlagen.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;
use crate::models::UserStatus;
use crate::repository::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct SqliteDb {
    pub(crate) pool: SqlitePool,
}

impl SqliteDb {
    /// Oeffnet die Datenbank, migriert und setzt verwaiste Benutzer zurueck
    pub async fn oeffnen(config: &DatabaseConfig) -> Result<Self, DbError> {
        let journal = if config.sqlite_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        let opts = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(journal)
            // Bei WAL reicht NORMAL; ein verlorenes Verfuegbarkeits-Update ist unkritisch
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_verbindungen.max(1))
            .connect_with(opts)
            .await?;

        let db = Self::einrichten(pool).await?;
        let zurueckgesetzt = db.verwaiste_zuruecksetzen().await?;
        tracing::info!(
            url = %config.url,
            wal = config.sqlite_wal,
            zurueckgesetzt,
            "SQLite-Benutzerspeicher bereit"
        );
        Ok(db)
    }

    /// Frische In-Memory-Datenbank (Tests)
    pub async fn in_memory() -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Jede Verbindung haette sonst ihre eigene leere Datenbank
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(opts)
            .await?;
        Self::einrichten(pool).await
    }

    async fn einrichten(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Migrationen der Benutzer-Tabelle angewendet");
        Ok(Self { pool })
    }

    /// Setzt alle noch als aktiv markierten Benutzer auf inaktiv/available
    ///
    /// Gibt die Anzahl der geaenderten Datensaetze zurueck.
    pub async fn verwaiste_zuruecksetzen(&self) -> Result<u64, DbError> {
        let ergebnis = sqlx::query("UPDATE users SET active = 0, status = ? WHERE active = 1")
            .bind(UserStatus::Available.als_str())
            .execute(&self.pool)
            .await?;
        Ok(ergebnis.rows_affected())
    }
}
