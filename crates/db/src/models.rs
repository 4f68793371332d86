//! Datenbankmodelle fuer randchat
//!
//! Ein Benutzer-Datensatz kennt nur zwei Flags: ob der Benutzer gerade
//! die Seite offen hat (`active`) und ob er frei fuer eine Paarung ist
//! (`status`). Mehr braucht der Legacy-Polling-Pfad nicht.

use chrono::{DateTime, Utc};
use randchat_core::types::UserId;
use serde::{Deserialize, Serialize};

/// Verfuegbarkeit eines Benutzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Frei fuer eine neue Paarung
    Available,
    /// In einem Gespraech
    Engaged,
}

impl UserStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Engaged => "engaged",
        }
    }

    pub fn aus_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "engaged" => Some(Self::Engaged),
            _ => None,
        }
    }
}

/// Benutzer-Datensatz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub active: bool,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Frisch angelegter Benutzer: aktiv und verfuegbar
    pub fn neu(id: UserId) -> Self {
        Self {
            id,
            active: true,
            status: UserStatus::Available,
            created_at: Utc::now(),
        }
    }

    /// Kommt der Benutzer als zufaelliger Gespraechspartner in Frage?
    pub fn ist_verfuegbar(&self) -> bool {
        self.active && self.status == UserStatus::Available
    }
}

/// Teil-Update der Verfuegbarkeit – nur gesetzte Felder werden geaendert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityUpdate {
    pub active: Option<bool>,
    pub status: Option<UserStatus>,
}

impl AvailabilityUpdate {
    /// Setzt beide Felder
    pub fn beide(active: bool, status: UserStatus) -> Self {
        Self {
            active: Some(active),
            status: Some(status),
        }
    }

    pub fn nur_active(active: bool) -> Self {
        Self {
            active: Some(active),
            status: None,
        }
    }

    pub fn nur_status(status: UserStatus) -> Self {
        Self {
            active: None,
            status: Some(status),
        }
    }

    pub fn ist_leer(&self) -> bool {
        self.active.is_none() && self.status.is_none()
    }

    /// Wendet das Update auf einen Datensatz an
    pub fn anwenden(&self, record: &mut UserRecord) {
        if let Some(active) = self.active {
            record.active = active;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}
