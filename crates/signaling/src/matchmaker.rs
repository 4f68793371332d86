//! Matchmaker – Warteschlange, Paarung und "Next"

use randchat_core::types::UserId;
use randchat_protocol::control::{MatchFound, Role};
use randchat_protocol::ServerEvent;

use crate::error::{SignalingError, SignalingResult};
use crate::queue::QueueEntry;
use crate::registry::{MatchRegistry, Paarung};
use crate::sessions::{SessionRecord, GRUND_BEENDET};
use crate::user_state::Phase;

/// Ergebnis von [`MatchRegistry::session_beenden`]
#[derive(Debug, Default)]
pub struct SessionEnde {
    /// Beendete Session, falls eine lief
    pub beendet: Option<SessionRecord>,
    /// Neue Paarung, falls mit "Next" sofort jemand gefunden wurde
    pub paarung: Option<Paarung>,
}

impl MatchRegistry {
    /// Reiht `user` ein, meldet die Position und versucht sofort zu paaren
    ///
    /// Nur aus idle erlaubt; sonst `UngueltigerUebergang` ohne Zustandsaenderung.
    pub fn einreihen(&mut self, user: &UserId) -> SignalingResult<Option<Paarung>> {
        self.zustaende.pruefen(user, Phase::Queued)?;
        let verbindung = self
            .directory
            .handle(user)
            .map(|h| h.id)
            .ok_or_else(|| SignalingError::protokoll(format!("{user} ohne Verbindung")))?;

        let position = self
            .queue
            .einreihen(QueueEntry::neu(user.clone(), verbindung));
        self.zustaende.wechseln(user, Phase::Queued, None)?;
        self.directory
            .senden_an(user, ServerEvent::queued(position));

        tracing::debug!(user_id = %user, position, "Eingereiht");
        Ok(self.paaren_falls_moeglich())
    }

    /// Paart die zwei aeltesten Wartenden, falls mindestens zwei warten
    ///
    /// Zeigen beide Eintraege auf dieselbe Kennung, kommt der zweite zurueck
    /// an die Spitze und diese Runde endet ohne Session.
    pub fn paaren_falls_moeglich(&mut self) -> Option<Paarung> {
        let (erster, zweiter) = self.queue.paar_entnehmen()?;

        if erster.user == zweiter.user {
            tracing::warn!(user_id = %erster.user, "Selbstpaarung verhindert");
            self.queue.vorne_einfuegen(zweiter);
            return None;
        }

        let initiator = erster.user;
        let responder = zweiter.user;
        let session = self
            .sessions
            .anlegen(initiator.clone(), responder.clone());

        for user in [&initiator, &responder] {
            if let Err(e) = self.zustaende.wechseln(user, Phase::Matched, Some(session)) {
                // Nur erreichbar wenn Warteschlange und Zustand auseinanderlaufen
                tracing::error!(user_id = %user, fehler = %e, "Paarung mit inkonsistentem Zustand");
            }
        }

        self.directory.senden_an(
            &initiator,
            ServerEvent::MatchFound(MatchFound {
                session_id: session,
                remote_user_id: responder.clone(),
                role: Role::Initiator,
            }),
        );
        self.directory.senden_an(
            &responder,
            ServerEvent::MatchFound(MatchFound {
                session_id: session,
                remote_user_id: initiator.clone(),
                role: Role::Responder,
            }),
        );

        tracing::info!(
            session_id = %session,
            initiator = %initiator,
            responder = %responder,
            "Paarung erstellt"
        );

        Some(Paarung {
            session,
            initiator,
            responder,
        })
    }

    /// Verlaesst die Warteschlange und geht auf idle; ohne Eintrag ein No-op
    ///
    /// Kommt leave-queue nach einer Paarung an (match-found war schon
    /// unterwegs), wird die Session beendet und das Gegenueber bekommt
    /// session-ended. Gibt die beendete Session zurueck.
    pub fn warteschlange_verlassen(
        &mut self,
        user: &UserId,
    ) -> SignalingResult<Option<SessionRecord>> {
        let zustand = self
            .zustaende
            .get(user)
            .cloned()
            .ok_or_else(|| SignalingError::protokoll(format!("Kein Zustand fuer {user}")))?;

        let mut beendet = None;
        match zustand.phase {
            Phase::Queued => {
                self.queue.entfernen(user);
                self.zustaende.wechseln(user, Phase::Idle, None)?;
            }
            Phase::Idle => {
                self.queue.entfernen(user);
            }
            Phase::Matched | Phase::InCall => {
                if let Some(sid) = zustand.session {
                    beendet = self.beenden(&sid, GRUND_BEENDET, user);
                }
            }
        }

        self.directory
            .senden_an(user, ServerEvent::idle("You left the search"));
        tracing::debug!(user_id = %user, session_beendet = beendet.is_some(), "Warteschlange verlassen");
        Ok(beendet)
    }

    /// Beendet, was `user` gerade tut, und reiht ihn bei `find_next` neu ein
    ///
    /// - queued: raus aus der Warteschlange
    /// - matched/in-call: Session beenden, Gegenueber bekommt session-ended
    /// - idle: nichts zu beenden
    pub fn session_beenden(
        &mut self,
        user: &UserId,
        find_next: bool,
    ) -> SignalingResult<SessionEnde> {
        let zustand = self
            .zustaende
            .get(user)
            .cloned()
            .ok_or_else(|| SignalingError::protokoll(format!("Kein Zustand fuer {user}")))?;

        let mut ende = SessionEnde::default();
        match zustand.phase {
            Phase::Queued => {
                self.queue.entfernen(user);
                self.zustaende.wechseln(user, Phase::Idle, None)?;
            }
            Phase::Matched | Phase::InCall => {
                if let Some(sid) = zustand.session {
                    ende.beendet = self.beenden(&sid, GRUND_BEENDET, user);
                }
            }
            Phase::Idle => {}
        }

        if find_next {
            ende.paarung = self.einreihen(user)?;
        } else {
            self.directory
                .senden_an(user, ServerEvent::idle("Chat ended"));
        }
        Ok(ende)
    }
}
