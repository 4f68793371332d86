//! Verbindungsverzeichnis: Benutzer-Kennung -> aktuelle Verbindung
//!
//! Pro Kennung gibt es hoechstens eine Verbindung. Ein neuer Connect mit
//! derselben Kennung ersetzt den alten Eintrag, die alte Verbindung wird
//! nicht benachrichtigt.

use randchat_core::types::{ConnectionId, UserId};
use randchat_protocol::ServerEvent;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn neu(id: ConnectionId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    /// Sendet ein Event nicht-blockierend an die Verbindung
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.id, "Send-Queue voll – Event verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.id, "Send-Queue geschlossen");
                false
            }
        }
    }
}

/// Kennung -> aktuelle Verbindung
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    eintraege: HashMap<UserId, ConnectionHandle>,
}

impl ConnectionDirectory {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert eine Verbindung, gibt die ersetzte zurueck
    pub fn registrieren(
        &mut self,
        user: UserId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.eintraege.insert(user, handle)
    }

    pub fn handle(&self, user: &UserId) -> Option<&ConnectionHandle> {
        self.eintraege.get(user)
    }

    /// Ist `verbindung` die aktuelle Verbindung von `user`?
    pub fn ist_aktuell(&self, user: &UserId, verbindung: ConnectionId) -> bool {
        self.eintraege
            .get(user)
            .is_some_and(|h| h.id == verbindung)
    }

    /// Sendet an die aktuelle Verbindung von `user`
    pub fn senden_an(&self, user: &UserId, event: ServerEvent) -> bool {
        match self.eintraege.get(user) {
            Some(handle) => handle.senden(event),
            None => false,
        }
    }

    pub fn entfernen(&mut self, user: &UserId) -> Option<ConnectionHandle> {
        self.eintraege.remove(user)
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }
}
