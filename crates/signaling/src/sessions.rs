//! Session-Registry: wer ist mit wem gepaart
//!
//! Ein Datensatz pro Paarung. Teilnehmer werden nie ausgetauscht; eine
//! Session endet durch Entfernen des Datensatzes.

use chrono::{DateTime, Utc};
use randchat_core::types::{SessionId, UserId};
use serde::Serialize;
use std::collections::HashMap;

/// Grund fuer session-ended: Gegenueber hat beendet
pub const GRUND_BEENDET: &str = "peer-ended";
/// Grund fuer session-ended: Gegenueber hat die Verbindung verloren
pub const GRUND_GETRENNT: &str = "peer-disconnected";

/// Lebenszyklus einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Initiator
    pub a: UserId,
    /// Responder
    pub b: UserId,
    pub phase: SessionPhase,
    pub erstellt: DateTime<Utc>,
}

impl SessionRecord {
    pub fn ist_teilnehmer(&self, user: &UserId) -> bool {
        &self.a == user || &self.b == user
    }

    /// Der jeweils andere Teilnehmer
    pub fn gegenueber(&self, user: &UserId) -> Option<&UserId> {
        if &self.a == user {
            Some(&self.b)
        } else if &self.b == user {
            Some(&self.a)
        } else {
            None
        }
    }

    pub fn teilnehmer(&self) -> [&UserId; 2] {
        [&self.a, &self.b]
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionRecord>,
}

impl SessionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine neue Session im Zustand `connecting` an
    pub fn anlegen(&mut self, initiator: UserId, responder: UserId) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(
            id,
            SessionRecord {
                id,
                a: initiator,
                b: responder,
                phase: SessionPhase::Connecting,
                erstellt: Utc::now(),
            },
        );
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<&SessionRecord> {
        self.sessions.get(id)
    }

    /// connecting -> connected. Gibt `true` zurueck wenn sich etwas geaendert hat.
    pub fn verbunden_markieren(&mut self, id: &SessionId) -> Option<bool> {
        let session = self.sessions.get_mut(id)?;
        let geaendert = session.phase == SessionPhase::Connecting;
        session.phase = SessionPhase::Connected;
        Some(geaendert)
    }

    pub fn entfernen(&mut self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.remove(id)
    }

    /// Anzahl Sessions, die `user` nennen (fuer Invarianten-Pruefungen)
    pub fn anzahl_mit(&self, user: &UserId) -> usize {
        self.sessions
            .values()
            .filter(|s| s.ist_teilnehmer(user))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionRecord> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
