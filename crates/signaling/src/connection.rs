//! Verbindungsschleife – gemeinsam fuer WebSocket und TCP
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Die Schleife
//! kennt nur einen Stream dekodierter `ClientEvent`s und einen Sink fuer
//! `ServerEvent`s; das Framing macht der jeweilige Transport.
//!
//! ## Ablauf
//! ```text
//! Transport --ClientEvent--> Engine
//! Engine --ServerEvent--> Send-Queue --> Transport
//! Ende (Client, Fehler, Shutdown) --> Engine: Geschlossen
//! ```

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use randchat_protocol::{ClientEvent, ErrorCode, ServerEvent};
use std::fmt::Display;
use tokio::sync::{mpsc, watch};

use crate::engine::EngineHandle;

/// Fehler beim Lesen vom Transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EingangsFehler {
    /// Frame gelesen, aber kein gueltiges Event; Verbindung bleibt offen
    Ungueltig(String),
    /// Transport kaputt oder vom Client geschlossen
    Transport(String),
}

/// Bedient eine Verbindung bis zum Ende und meldet sie dann ab
pub async fn verbindung_bedienen<S, K>(
    engine: EngineHandle,
    eingang: S,
    ausgang: K,
    mut shutdown_rx: watch::Receiver<bool>,
    send_queue_groesse: usize,
    peer: &str,
) where
    S: Stream<Item = Result<ClientEvent, EingangsFehler>>,
    K: Sink<ServerEvent>,
    K::Error: Display,
{
    tokio::pin!(eingang);
    tokio::pin!(ausgang);

    if *shutdown_rx.borrow() {
        let _ = ausgang.send(abschied()).await;
        return;
    }

    let (sende_tx, mut sende_rx) = mpsc::channel::<ServerEvent>(send_queue_groesse.max(1));
    let verbindung = match engine.oeffnen(sende_tx).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(peer, fehler = %e, "Engine nicht erreichbar");
            return;
        }
    };
    tracing::info!(peer, verbindung = %verbindung, "Neue Verbindung");

    loop {
        tokio::select! {
            frame = eingang.next() => {
                match frame {
                    Some(Ok(event)) => {
                        tracing::trace!(verbindung = %verbindung, event = event.name(), "Event empfangen");
                        if engine.nachricht(verbindung, event).await.is_err() {
                            tracing::warn!(verbindung = %verbindung, "Engine beendet");
                            break;
                        }
                    }
                    Some(Err(EingangsFehler::Ungueltig(grund))) => {
                        tracing::debug!(verbindung = %verbindung, grund = %grund, "Ungueltiges Event");
                        let antwort = ServerEvent::error(ErrorCode::InvalidRequest, "Malformed event");
                        if let Err(e) = ausgang.send(antwort).await {
                            tracing::warn!(verbindung = %verbindung, fehler = %e, "Senden fehlgeschlagen");
                            break;
                        }
                    }
                    Some(Err(EingangsFehler::Transport(grund))) => {
                        tracing::debug!(verbindung = %verbindung, grund = %grund, "Transport beendet");
                        break;
                    }
                    None => {
                        tracing::info!(verbindung = %verbindung, "Verbindung vom Client getrennt");
                        break;
                    }
                }
            }

            Some(ausgehend) = sende_rx.recv() => {
                if let Err(e) = ausgang.send(ausgehend).await {
                    tracing::warn!(verbindung = %verbindung, fehler = %e, "Senden fehlgeschlagen");
                    break;
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!(verbindung = %verbindung, "Shutdown-Signal, Verbindung wird getrennt");
                    let _ = ausgang.send(abschied()).await;
                    break;
                }
            }
        }
    }

    engine.schliessen(verbindung).await;
    tracing::debug!(verbindung = %verbindung, "Verbindungs-Task beendet");
}

fn abschied() -> ServerEvent {
    ServerEvent::error(ErrorCode::ShuttingDown, "server shutting down")
}
