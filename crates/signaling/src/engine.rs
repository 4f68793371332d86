//! Engine – die eine Task, die den Vermittlungszustand besitzt
//!
//! Alle Verbindungen schicken ihre Events ueber eine mpsc-Queue an die
//! Engine. Die Engine verarbeitet sie strikt nacheinander und synchron,
//! jedes Event laeuft vollstaendig durch bevor das naechste beginnt.
//! Antworten gehen ueber die Send-Queue der jeweiligen Verbindung zurueck.
//!
//! ```text
//! Verbindung (WS/TCP) --EngineEvent--> Engine --ServerEvent--> Verbindung
//!                                        |
//!                                        +--> PersistenzKanal (Seitenkanal)
//! ```

use randchat_core::types::{ConnectionId, UserId};
use randchat_db::UserStore;
use randchat_observability::MatchMetrics;
use randchat_protocol::{ClientEvent, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::directory::ConnectionHandle;
use crate::error::{SignalingError, SignalingResult};
use crate::persistence::{PersistenzAuftrag, PersistenzKanal};
use crate::registry::{MatchRegistry, RegistryStats};

/// Groessen der Engine-Queues
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_queue_groesse: usize,
    pub persistenz_queue_groesse: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_queue_groesse: 1024,
            persistenz_queue_groesse: 1024,
        }
    }
}

/// Eingang der Engine
#[derive(Debug)]
pub enum EngineEvent {
    /// Neue Transportverbindung, noch ohne Identitaet
    Geoeffnet {
        verbindung: ConnectionId,
        tx: mpsc::Sender<ServerEvent>,
    },
    /// Dekodiertes Client-Event
    Nachricht {
        verbindung: ConnectionId,
        event: ClientEvent,
    },
    /// Transport geschlossen
    Geschlossen { verbindung: ConnectionId },
    Statistik {
        antwort: oneshot::Sender<RegistryStats>,
    },
    Invarianten {
        antwort: oneshot::Sender<Result<(), String>>,
    },
}

/// Handle auf die Engine, guenstig zu klonen
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Meldet eine neue Verbindung an
    pub async fn oeffnen(&self, tx: mpsc::Sender<ServerEvent>) -> SignalingResult<ConnectionId> {
        let verbindung = ConnectionId::new();
        self.senden(EngineEvent::Geoeffnet { verbindung, tx }).await?;
        Ok(verbindung)
    }

    pub async fn nachricht(
        &self,
        verbindung: ConnectionId,
        event: ClientEvent,
    ) -> SignalingResult<()> {
        self.senden(EngineEvent::Nachricht { verbindung, event })
            .await
    }

    /// Meldet das Ende einer Verbindung; die Engine raeumt auf
    pub async fn schliessen(&self, verbindung: ConnectionId) {
        if self
            .senden(EngineEvent::Geschlossen { verbindung })
            .await
            .is_err()
        {
            tracing::debug!(verbindung = %verbindung, "Engine bereits beendet");
        }
    }

    /// Momentaufnahme, in Reihenfolge mit allen vorher gesendeten Events
    pub async fn statistik(&self) -> SignalingResult<RegistryStats> {
        let (antwort, rx) = oneshot::channel();
        self.senden(EngineEvent::Statistik { antwort }).await?;
        rx.await.map_err(|_| SignalingError::SendFehler)
    }

    /// Prueft die Registry-Invarianten (fuer Tests und Diagnose)
    pub async fn invarianten_pruefen(&self) -> SignalingResult<Result<(), String>> {
        let (antwort, rx) = oneshot::channel();
        self.senden(EngineEvent::Invarianten { antwort }).await?;
        rx.await.map_err(|_| SignalingError::SendFehler)
    }

    async fn senden(&self, event: EngineEvent) -> SignalingResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SignalingError::SendFehler)
    }
}

/// Transportverbindung aus Sicht der Engine
#[derive(Debug)]
pub(crate) struct Verbindung {
    pub(crate) handle: ConnectionHandle,
    /// Per identify gebundene Kennung
    pub(crate) user: Option<UserId>,
}

pub struct Engine {
    pub(crate) registry: MatchRegistry,
    pub(crate) verbindungen: HashMap<ConnectionId, Verbindung>,
    pub(crate) persistenz: PersistenzKanal,
    pub(crate) metriken: Option<MatchMetrics>,
}

impl Engine {
    pub fn neu(persistenz: PersistenzKanal, metriken: Option<MatchMetrics>) -> Self {
        Self {
            registry: MatchRegistry::neu(),
            verbindungen: HashMap::new(),
            persistenz,
            metriken,
        }
    }

    /// Startet die Engine-Task samt Persistenz-Worker
    pub fn starten(
        config: EngineConfig,
        store: Option<Arc<dyn UserStore>>,
        metriken: Option<MatchMetrics>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let persistenz =
            PersistenzKanal::starten(store, metriken.clone(), config.persistenz_queue_groesse);
        let engine = Self::neu(persistenz, metriken);

        let (tx, rx) = mpsc::channel(config.event_queue_groesse.max(1));
        let task = tokio::spawn(engine.laufen(rx));
        (EngineHandle { tx }, task)
    }

    async fn laufen(mut self, mut rx: mpsc::Receiver<EngineEvent>) {
        tracing::info!("Vermittlungs-Engine gestartet");
        while let Some(event) = rx.recv().await {
            self.verarbeiten(event);
        }
        tracing::info!("Vermittlungs-Engine beendet");
    }

    /// Verarbeitet genau ein Event vollstaendig
    pub fn verarbeiten(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Geoeffnet { verbindung, tx } => {
                self.verbindungen.insert(
                    verbindung,
                    Verbindung {
                        handle: ConnectionHandle::neu(verbindung, tx),
                        user: None,
                    },
                );
                tracing::debug!(verbindung = %verbindung, "Verbindung angemeldet");
            }
            EngineEvent::Nachricht { verbindung, event } => self.dispatch(verbindung, event),
            EngineEvent::Geschlossen { verbindung } => self.geschlossen(verbindung),
            EngineEvent::Statistik { antwort } => {
                let _ = antwort.send(self.registry.statistik());
            }
            EngineEvent::Invarianten { antwort } => {
                let _ = antwort.send(self.registry.invarianten_pruefen());
            }
        }
        self.metriken_aktualisieren();
    }

    /// Gleiches Aufraeumen wie end-session, danach Zustand loeschen
    fn geschlossen(&mut self, verbindung: ConnectionId) {
        let Some(eintrag) = self.verbindungen.remove(&verbindung) else {
            return;
        };
        let Some(user) = eintrag.user else {
            tracing::debug!(verbindung = %verbindung, "Unidentifizierte Verbindung getrennt");
            return;
        };

        if let Some(trennung) = self.registry.trennen(&user, verbindung) {
            if let Some(session) = trennung.beendet {
                for t in session.teilnehmer() {
                    if t != &user {
                        self.persistenz.senden(PersistenzAuftrag::Frei(t.clone()));
                    }
                }
            }
            self.persistenz
                .senden(PersistenzAuftrag::Getrennt(user.clone()));
            tracing::info!(user_id = %user, verbindung = %verbindung, "Benutzer getrennt");
        }
    }

    fn metriken_aktualisieren(&self) {
        if let Some(m) = &self.metriken {
            let s = self.registry.statistik();
            m.zustand_setzen(s.connected_users, s.queue_length, s.active_sessions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randchat_protocol::control::{IdentifyRequest, QueueRequest};

    fn identify(name: &str) -> ClientEvent {
        ClientEvent::Identify(IdentifyRequest {
            display_name: UserId::new(name),
        })
    }

    #[tokio::test]
    async fn statistik_folgt_den_events() {
        let metriken = MatchMetrics::neu().unwrap();
        let (engine, _task) =
            Engine::starten(EngineConfig::default(), None, Some(metriken.clone()));

        let (tx, _rx) = mpsc::channel(8);
        let v = engine.oeffnen(tx).await.unwrap();
        engine.nachricht(v, identify("a")).await.unwrap();
        engine
            .nachricht(v, ClientEvent::FindMatch(QueueRequest::default()))
            .await
            .unwrap();

        let stats = engine.statistik().await.unwrap();
        assert_eq!(stats.connected_users, 1);
        assert_eq!(stats.queue_length, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(metriken.queue_length.get(), 1);

        engine.schliessen(v).await;
        let stats = engine.statistik().await.unwrap();
        assert_eq!(stats.connected_users, 0);
        assert_eq!(stats.queue_length, 0);
        assert!(engine.invarianten_pruefen().await.unwrap().is_ok());
    }

    #[test]
    fn schliessen_unbekannter_verbindung_ist_noop() {
        let mut engine = Engine::neu(PersistenzKanal::deaktiviert(), None);
        engine.verarbeiten(EngineEvent::Geschlossen {
            verbindung: ConnectionId::new(),
        });
        assert!(engine.verbindungen.is_empty());
    }
}
