//! Signaling-Relay – Offer, Answer und ICE zwischen den zwei Teilnehmern
//!
//! Der Relay prueft nur Session und Absender. Der Inhalt (SDP, Kandidat)
//! wird nie gelesen und unveraendert weitergegeben.

use randchat_core::types::{SessionId, UserId};
use randchat_protocol::control::{SessionEnded, SignalMessage};
use randchat_protocol::ServerEvent;

use crate::error::{SignalingError, SignalingResult};
use crate::registry::MatchRegistry;
use crate::sessions::SessionRecord;
use crate::user_state::Phase;

/// Art einer weitergeleiteten Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalArt {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalArt {
    pub fn als_event(self, nachricht: SignalMessage) -> ServerEvent {
        match self {
            Self::Offer => ServerEvent::Offer(nachricht),
            Self::Answer => ServerEvent::Answer(nachricht),
            Self::IceCandidate => ServerEvent::IceCandidate(nachricht),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }
}

impl MatchRegistry {
    /// Leitet eine Handshake-Nachricht an den anderen Teilnehmer weiter
    ///
    /// Verworfen (mit Fehler fuer das Log, nie fuer den Absender) wenn die
    /// Session fehlt, `from` nicht teilnimmt, `to` nicht das Gegenueber ist
    /// oder das Gegenueber keine Verbindung mehr hat.
    pub fn weiterleiten(
        &self,
        art: SignalArt,
        nachricht: SignalMessage,
    ) -> SignalingResult<UserId> {
        let session = self.sessions.get(&nachricht.session_id).ok_or_else(|| {
            SignalingError::protokoll(format!(
                "{} fuer unbekannte {}",
                art.name(),
                nachricht.session_id
            ))
        })?;

        let ziel = session.gegenueber(&nachricht.from).cloned().ok_or_else(|| {
            SignalingError::protokoll(format!(
                "{} nimmt nicht an {} teil",
                nachricht.from, nachricht.session_id
            ))
        })?;

        if let Some(to) = &nachricht.to {
            if to != &ziel {
                return Err(SignalingError::protokoll(format!(
                    "{} adressiert {to}, Gegenueber ist {ziel}",
                    art.name()
                )));
            }
        }

        let handle = self
            .directory
            .handle(&ziel)
            .ok_or_else(|| SignalingError::PeerNichtErreichbar(ziel.clone()))?;

        if !handle.senden(art.als_event(nachricht)) {
            return Err(SignalingError::SendFehler);
        }
        Ok(ziel)
    }

    /// connecting -> connected, beide Teilnehmer -> in-call. Idempotent.
    pub fn verbunden_markieren(
        &mut self,
        user: &UserId,
        session_id: &SessionId,
    ) -> SignalingResult<bool> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SignalingError::protokoll(format!("Unbekannte {session_id}")))?;
        if !session.ist_teilnehmer(user) {
            return Err(SignalingError::protokoll(format!(
                "{user} nimmt nicht an {session_id} teil"
            )));
        }
        let [a, b] = session.teilnehmer();
        let teilnehmer = [a.clone(), b.clone()];

        let geaendert = self
            .sessions
            .verbunden_markieren(session_id)
            .unwrap_or(false);

        for t in &teilnehmer {
            if self.zustaende.phase(t) == Some(Phase::Matched) {
                self.zustaende.wechseln(t, Phase::InCall, Some(*session_id))?;
            }
        }

        if geaendert {
            tracing::info!(session_id = %session_id, "Session verbunden");
        }
        Ok(geaendert)
    }

    /// Beendet eine Session
    ///
    /// Wer nicht `beendet_von` ist, bekommt genau ein session-ended. Beide
    /// Teilnehmer gehen auf idle, der Datensatz wird entfernt.
    pub fn beenden(
        &mut self,
        session_id: &SessionId,
        grund: &str,
        beendet_von: &UserId,
    ) -> Option<SessionRecord> {
        let session = self.sessions.entfernen(session_id)?;

        for t in session.teilnehmer() {
            if t != beendet_von {
                self.directory.senden_an(
                    t,
                    ServerEvent::SessionEnded(SessionEnded {
                        session_id: *session_id,
                        reason: grund.to_string(),
                        ended_by: beendet_von.clone(),
                    }),
                );
            }
            let zeigt_hierauf = self
                .zustaende
                .get(t)
                .is_some_and(|z| z.session == Some(*session_id));
            if zeigt_hierauf {
                if let Err(e) = self.zustaende.wechseln(t, Phase::Idle, None) {
                    tracing::error!(user_id = %t, fehler = %e, "Zuruecksetzen nach Session-Ende");
                }
            }
        }

        tracing::info!(
            session_id = %session_id,
            beendet_von = %beendet_von,
            grund,
            "Session beendet"
        );
        Some(session)
    }
}
