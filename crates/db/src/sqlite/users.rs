//! SQLite-Implementierung des UserStore

use async_trait::async_trait;
use chrono::Utc;
use randchat_core::types::UserId;

use crate::error::DbError;
use crate::models::{AvailabilityUpdate, UserRecord, UserStatus};
use crate::repository::{DbResult, UserStore};
use crate::sqlite::pool::SqliteDb;

#[async_trait]
impl UserStore for SqliteDb {
    async fn create_user(&self) -> DbResult<UserId> {
        let id = UserId::zufaellig();

        sqlx::query(
            "INSERT INTO users (id, active, status, created_at)
             VALUES (?, 1, ?, ?)",
        )
        .bind(id.as_str())
        .bind(UserStatus::Available.als_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit(format!("Kennung '{id}' bereits vergeben"))
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(id)
    }

    async fn sicherstellen(&self, id: &UserId) -> DbResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, active, status, created_at)
             VALUES (?, 1, ?, ?)",
        )
        .bind(id.as_str())
        .bind(UserStatus::Available.als_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &UserId) -> DbResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, active, status, created_at FROM users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn aktualisieren(&self, id: &UserId, update: AvailabilityUpdate) -> DbResult<()> {
        // Dynamisches UPDATE – nur gesetzte Felder aendern
        let mut sets: Vec<&str> = Vec::new();
        if update.active.is_some() {
            sets.push("active = ?");
        }
        if update.status.is_some() {
            sets.push("status = ?");
        }

        if sets.is_empty() {
            return match self.get(id).await? {
                Some(_) => Ok(()),
                None => Err(DbError::nicht_gefunden(format!("User {id}"))),
            };
        }

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql);

        if let Some(v) = update.active {
            q = q.bind(v as i64);
        }
        if let Some(v) = update.status {
            q = q.bind(v.als_str());
        }
        q = q.bind(id.as_str());

        let affected = q.execute(&self.pool).await?.rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("User {id}")));
        }
        Ok(())
    }

    async fn find_random_available_peer(&self, excluding: &UserId) -> DbResult<Option<UserId>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM users
             WHERE active = 1 AND status = ? AND id <> ?
             ORDER BY RANDOM() LIMIT 1",
        )
        .bind(UserStatus::Available.als_str())
        .bind(excluding.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(UserId::new))
    }

    async fn anzahl_verfuegbar(&self) -> DbResult<u64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE active = 1 AND status = ?")
                .bind(UserStatus::Available.als_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(n.max(0) as u64)
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> DbResult<UserRecord> {
    use sqlx::Row as _;

    let id: String = row.try_get("id")?;

    let created_at_str: String = row.try_get("created_at")?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| DbError::intern(format!("Ungueltige created_at '{created_at_str}': {e}")))?
        .with_timezone(&Utc);

    let status_str: String = row.try_get("status")?;
    let status = UserStatus::aus_str(&status_str)
        .ok_or_else(|| DbError::UngueltigeDaten(format!("Unbekannter Status '{status_str}'")))?;

    let active: i64 = row.try_get("active")?;

    Ok(UserRecord {
        id: UserId::new(id),
        active: active != 0,
        status,
        created_at,
    })
}
