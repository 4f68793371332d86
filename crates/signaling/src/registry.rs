//! MatchRegistry – der gesamte Vermittlungszustand an einem Ort
//!
//! Buendelt Verzeichnis, Warteschlange, Sessions und Benutzerzustaende.
//! Die Registry gehoert exklusiv der Engine-Task; es gibt keine Locks und
//! keine Rueckverweise, alle Beziehungen laufen ueber Kennungen.
//!
//! Die Operationen sind auf drei Dateien verteilt:
//! - hier: Verbinden, Trennen, Statistik, Invarianten
//! - [`crate::matchmaker`]: Einreihen, Paaren, Verlassen, Beenden mit "Next"
//! - [`crate::relay`]: Weiterleiten, Verbunden-Markieren, Beenden

use randchat_core::types::{ConnectionId, SessionId, UserId};
use serde::Serialize;
use std::collections::HashSet;

use crate::directory::{ConnectionDirectory, ConnectionHandle};
use crate::queue::WaitQueue;
use crate::sessions::{SessionRecord, SessionRegistry, GRUND_GETRENNT};
use crate::user_state::{Phase, UserStates};

/// Momentaufnahme fuer `/api/stats` und Metriken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connected_users: usize,
    pub queue_length: usize,
    pub active_sessions: usize,
}

/// Ergebnis einer erfolgreichen Paarung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paarung {
    pub session: SessionId,
    pub initiator: UserId,
    pub responder: UserId,
}

/// Ergebnis von [`MatchRegistry::verbinden`]
#[derive(Debug)]
pub struct Anmeldung {
    /// Vorherige Verbindung derselben Kennung
    pub ersetzt: Option<ConnectionHandle>,
    /// Session, die durch den Reconnect beendet wurde
    pub beendet: Option<SessionRecord>,
}

/// Ergebnis von [`MatchRegistry::trennen`]
#[derive(Debug)]
pub struct Trennung {
    pub beendet: Option<SessionRecord>,
}

#[derive(Debug, Default)]
pub struct MatchRegistry {
    pub(crate) directory: ConnectionDirectory,
    pub(crate) queue: WaitQueue,
    pub(crate) sessions: SessionRegistry,
    pub(crate) zustaende: UserStates,
}

impl MatchRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bindet `user` an eine Verbindung und setzt ihn auf idle
    ///
    /// War die Kennung schon verbunden, gewinnt die neue Verbindung. Ein
    /// Warteschlangen-Eintrag verfaellt, eine laufende Session wird beendet.
    pub fn verbinden(&mut self, user: UserId, handle: ConnectionHandle) -> Anmeldung {
        let verbindung = handle.id;
        let ersetzt = self.directory.registrieren(user.clone(), handle);

        let mut beendet = None;
        if let Some(alt) = self.zustaende.get(&user).cloned() {
            self.queue.entfernen(&user);
            if let Some(sid) = alt.session {
                beendet = self.beenden(&sid, GRUND_GETRENNT, &user);
            }
            tracing::info!(user_id = %user, phase = %alt.phase, "Kennung neu verbunden");
        }

        self.zustaende.anlegen(user, verbindung);
        Anmeldung { ersetzt, beendet }
    }

    /// Raeumt alles zu `user` auf, sofern `verbindung` noch die aktuelle ist
    ///
    /// Gleiche Wirkung wie ein explizites Beenden: raus aus der
    /// Warteschlange, Session beenden, Zustand loeschen.
    pub fn trennen(&mut self, user: &UserId, verbindung: ConnectionId) -> Option<Trennung> {
        if !self.directory.ist_aktuell(user, verbindung) {
            tracing::debug!(
                user_id = %user,
                verbindung = %verbindung,
                "Veraltete Verbindung getrennt – kein Aufraeumen"
            );
            return None;
        }

        self.queue.entfernen(user);
        let beendet = self
            .zustaende
            .get(user)
            .and_then(|z| z.session)
            .and_then(|sid| self.beenden(&sid, GRUND_GETRENNT, user));
        self.zustaende.entfernen(user);
        self.directory.entfernen(user);

        Some(Trennung { beendet })
    }

    /// Ist `verbindung` die aktuelle Verbindung von `user`?
    pub fn ist_aktuell(&self, user: &UserId, verbindung: ConnectionId) -> bool {
        self.directory.ist_aktuell(user, verbindung)
    }

    pub fn phase(&self, user: &UserId) -> Option<Phase> {
        self.zustaende.phase(user)
    }

    pub fn session_von(&self, user: &UserId) -> Option<SessionId> {
        self.zustaende.get(user).and_then(|z| z.session)
    }

    pub fn session(&self, id: &SessionId) -> Option<&SessionRecord> {
        self.sessions.get(id)
    }

    pub fn warteschlangen_position(&self, user: &UserId) -> Option<usize> {
        self.queue.position(user)
    }

    pub fn statistik(&self) -> RegistryStats {
        RegistryStats {
            connected_users: self.directory.len(),
            queue_length: self.queue.len(),
            active_sessions: self.sessions.len(),
        }
    }

    /// Prueft die Konsistenz aller Teilstrukturen
    ///
    /// - jede Kennung hoechstens einmal in der Warteschlange
    /// - queued genau dann, wenn in der Warteschlange
    /// - matched/in-call genau dann, wenn die referenzierte Session existiert
    ///   und den Benutzer nennt
    /// - jede Session nennt zwei verschiedene, verbundene Benutzer
    pub fn invarianten_pruefen(&self) -> Result<(), String> {
        let mut gesehen = HashSet::new();
        for eintrag in self.queue.iter() {
            if !gesehen.insert(&eintrag.user) {
                return Err(format!("{} doppelt in der Warteschlange", eintrag.user));
            }
            if self.zustaende.phase(&eintrag.user) != Some(Phase::Queued) {
                return Err(format!("{} wartet, ist aber nicht queued", eintrag.user));
            }
        }

        for (user, zustand) in self.zustaende.iter() {
            if zustand.phase == Phase::Queued && !self.queue.enthaelt(user) {
                return Err(format!("{user} ist queued, fehlt aber in der Warteschlange"));
            }
            match (zustand.phase.hat_session(), zustand.session) {
                (true, Some(sid)) => match self.sessions.get(&sid) {
                    Some(s) if s.ist_teilnehmer(user) => {}
                    _ => return Err(format!("{user} verweist auf fremde Session {sid}")),
                },
                (true, None) => return Err(format!("{user} ist {} ohne Session", zustand.phase)),
                (false, Some(sid)) => {
                    return Err(format!("{user} ist {} mit Session {sid}", zustand.phase))
                }
                (false, None) => {}
            }
            if !self.directory.ist_aktuell(user, zustand.verbindung) {
                return Err(format!("{user} hat Zustand ohne aktuelle Verbindung"));
            }
        }

        for s in self.sessions.iter() {
            if s.a == s.b {
                return Err(format!("Session {} paart {} mit sich selbst", s.id, s.a));
            }
            for t in s.teilnehmer() {
                if self.zustaende.get(t).and_then(|z| z.session) != Some(s.id) {
                    return Err(format!("Session {} nennt {t}, der nicht darauf zeigt", s.id));
                }
            }
        }

        Ok(())
    }
}
