//! Dispatcher – ordnet Client-Events den Registry-Operationen zu
//!
//! ## Identitaet
//! Die Kennung eines Events ist immer die per `identify` an die
//! Verbindung gebundene. Payload-Felder wie `user_id` oder `from` werden
//! nur gegen diese Bindung geprueft, nie als Quelle genommen.
//! - vor `identify`: Fehler `NOT_IDENTIFIED`
//! - abweichende Kennung im Payload: Protokollverletzung, verworfen
//! - Verbindung durch Reconnect ersetzt: verworfen

use randchat_core::types::{ConnectionId, UserId};
use randchat_protocol::{ClientEvent, ErrorCode, ServerEvent};

use crate::directory::ConnectionHandle;
use crate::engine::Engine;
use crate::error::{SignalingError, SignalingResult};
use crate::matchmaker::SessionEnde;
use crate::persistence::PersistenzAuftrag;
use crate::registry::Paarung;
use crate::relay::SignalArt;

impl Engine {
    pub(crate) fn dispatch(&mut self, verbindung: ConnectionId, event: ClientEvent) {
        let Some(eintrag) = self.verbindungen.get(&verbindung) else {
            tracing::debug!(verbindung = %verbindung, "Event von unbekannter Verbindung");
            return;
        };
        let handle = eintrag.handle.clone();
        let gebunden = eintrag.user.clone();

        let event = match event {
            ClientEvent::Ping(ping) => {
                let jetzt = chrono::Utc::now().timestamp_millis().max(0) as u64;
                handle.senden(ServerEvent::pong(ping.timestamp_ms, jetzt));
                return;
            }
            ClientEvent::Identify(req) => {
                self.identifizieren(verbindung, handle, gebunden, req.display_name);
                return;
            }
            andere => andere,
        };

        let Some(user) = gebunden else {
            handle.senden(ServerEvent::error(
                ErrorCode::NotIdentified,
                client_meldung(ErrorCode::NotIdentified),
            ));
            return;
        };

        if !self.registry.ist_aktuell(&user, verbindung) {
            tracing::debug!(
                user_id = %user,
                verbindung = %verbindung,
                event = event.name(),
                "Event von ersetzter Verbindung verworfen"
            );
            self.verworfen("veraltet");
            return;
        }

        let name = event.name();
        if let Err(e) = self.ausfuehren(&user, event) {
            self.fehler_behandeln(&handle, &user, name, e);
        }
    }

    fn ausfuehren(&mut self, user: &UserId, event: ClientEvent) -> SignalingResult<()> {
        match event {
            ClientEvent::FindMatch(req) => {
                kennung_pruefen(user, req.user_id.as_ref())?;
                let paarung = self.registry.einreihen(user)?;
                self.paarung_melden(paarung);
            }
            ClientEvent::LeaveQueue(req) => {
                kennung_pruefen(user, req.user_id.as_ref())?;
                let beendet = self.registry.warteschlange_verlassen(user)?;
                self.ende_melden(SessionEnde {
                    beendet,
                    paarung: None,
                });
            }
            ClientEvent::Offer(msg) => self.weiterleiten(user, SignalArt::Offer, msg)?,
            ClientEvent::Answer(msg) => self.weiterleiten(user, SignalArt::Answer, msg)?,
            ClientEvent::IceCandidate(msg) => {
                self.weiterleiten(user, SignalArt::IceCandidate, msg)?
            }
            ClientEvent::ConnectionEstablished(req) => {
                kennung_pruefen(user, req.user_id.as_ref())?;
                self.registry.verbunden_markieren(user, &req.session_id)?;
            }
            ClientEvent::EndSession(req) => {
                kennung_pruefen(user, req.user_id.as_ref())?;
                let ende = self.registry.session_beenden(user, req.find_next)?;
                self.ende_melden(ende);
            }
            ClientEvent::RemoteUserClosed(req) => {
                kennung_pruefen(user, req.username.as_ref())?;
                let ende = self.registry.session_beenden(user, false)?;
                self.ende_melden(ende);
            }
            ClientEvent::Identify(_) | ClientEvent::Ping(_) => {}
        }
        Ok(())
    }

    fn identifizieren(
        &mut self,
        verbindung: ConnectionId,
        handle: ConnectionHandle,
        gebunden: Option<UserId>,
        name: UserId,
    ) {
        match gebunden {
            Some(alt) if alt == name => {
                tracing::debug!(user_id = %name, "identify wiederholt");
                return;
            }
            Some(alt) => {
                tracing::debug!(user_id = %alt, neu = %name, "Zweites identify abgelehnt");
                handle.senden(ServerEvent::error(
                    ErrorCode::AlreadyIdentified,
                    client_meldung(ErrorCode::AlreadyIdentified),
                ));
                return;
            }
            None => {}
        }

        if name.as_str().trim().is_empty() {
            handle.senden(ServerEvent::error(
                ErrorCode::InvalidRequest,
                "display_name must not be empty",
            ));
            return;
        }

        if let Some(eintrag) = self.verbindungen.get_mut(&verbindung) {
            eintrag.user = Some(name.clone());
        }

        let anmeldung = self.registry.verbinden(name.clone(), handle);
        if let Some(alt) = anmeldung.ersetzt {
            tracing::info!(user_id = %name, alte_verbindung = %alt.id, "Verbindung ersetzt");
        }
        if let Some(session) = anmeldung.beendet {
            for t in session.teilnehmer() {
                if t != &name {
                    self.persistenz.senden(PersistenzAuftrag::Frei(t.clone()));
                }
            }
        }
        self.persistenz
            .senden(PersistenzAuftrag::Identifiziert(name.clone()));
        tracing::info!(user_id = %name, verbindung = %verbindung, "Benutzer identifiziert");
    }

    fn weiterleiten(
        &mut self,
        user: &UserId,
        art: SignalArt,
        msg: randchat_protocol::control::SignalMessage,
    ) -> SignalingResult<()> {
        if &msg.from != user {
            return Err(SignalingError::protokoll(format!(
                "{} mit from={} auf Verbindung von {user}",
                art.name(),
                msg.from
            )));
        }
        let ziel = self.registry.weiterleiten(art, msg)?;
        tracing::trace!(von = %user, an = %ziel, art = art.name(), "Weitergeleitet");
        if let Some(m) = &self.metriken {
            m.relayed_messages_total.inc();
        }
        Ok(())
    }

    fn paarung_melden(&self, paarung: Option<Paarung>) {
        let Some(p) = paarung else {
            return;
        };
        if let Some(m) = &self.metriken {
            m.matches_total.inc();
        }
        self.persistenz
            .senden(PersistenzAuftrag::Gepaart(p.initiator, p.responder));
    }

    fn ende_melden(&self, ende: SessionEnde) {
        if let Some(session) = ende.beendet {
            for t in session.teilnehmer() {
                self.persistenz.senden(PersistenzAuftrag::Frei(t.clone()));
            }
        }
        self.paarung_melden(ende.paarung);
    }

    fn fehler_behandeln(
        &self,
        handle: &ConnectionHandle,
        user: &UserId,
        event: &str,
        fehler: SignalingError,
    ) {
        match fehler.fehler_code() {
            Some(code) => {
                tracing::debug!(user_id = %user, event, fehler = %fehler, "Abgelehnt");
                handle.senden(ServerEvent::error(code, client_meldung(code)));
            }
            None => {
                match &fehler {
                    SignalingError::ProtokollVerletzung(_) => {
                        tracing::warn!(user_id = %user, event, fehler = %fehler, "Verworfen")
                    }
                    _ => tracing::debug!(user_id = %user, event, fehler = %fehler, "Verworfen"),
                }
                self.verworfen(fehler.verwurf_grund());
            }
        }
    }

    fn verworfen(&self, grund: &str) {
        if let Some(m) = &self.metriken {
            m.verworfen(grund);
        }
    }
}

/// Payload-Kennung muss, falls vorhanden, zur Bindung passen
fn kennung_pruefen(gebunden: &UserId, payload: Option<&UserId>) -> SignalingResult<()> {
    match payload {
        Some(id) if id != gebunden => Err(SignalingError::protokoll(format!(
            "Kennung {id} auf Verbindung von {gebunden}"
        ))),
        _ => Ok(()),
    }
}

fn client_meldung(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::AlreadyActive => "You are already searching or in a chat",
        ErrorCode::InvalidRequest => "Request is not valid right now",
        ErrorCode::NotIdentified => "Send identify before any other event",
        ErrorCode::AlreadyIdentified => "This connection is already identified",
        ErrorCode::ServerFull => "server full",
        ErrorCode::ShuttingDown => "server shutting down",
    }
}
