//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task. Frames sind
//! laengenpraefixiertes JSON (`ServerCodec`), danach laeuft dieselbe
//! Verbindungsschleife wie fuer WebSocket.

use futures_util::{SinkExt, StreamExt};
use randchat_protocol::{ErrorCode, ServerCodec, ServerEvent};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::connection::{verbindung_bedienen, EingangsFehler};
use crate::server_state::{SignalingState, VerbindungsPlatz};

/// TCP-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet den Socket und akzeptiert bis zum Shutdown-Signal
    pub async fn starten(self) -> io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.starten_mit_listener(listener).await
    }

    /// Wie `starten`, mit bereits gebundenem Listener (Tests: Port 0)
    pub async fn starten_mit_listener(self, listener: TcpListener) -> io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        let mut shutdown_rx = self.state.shutdown_rx.clone();

        tracing::info!(adresse = %lokale_addr, "TCP Signaling-Server gestartet");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Some(platz) = self.state.verbindungs_platz() else {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_clients,
                                    "Server voll, Verbindung abgelehnt"
                                );
                                tokio::spawn(ablehnen(stream, self.state.config.max_frame_groesse));
                                continue;
                            };

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            let state = Arc::clone(&self.state);
                            tokio::spawn(tcp_verbindung(state, stream, peer_addr, platz));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("TCP-Listener: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}

async fn tcp_verbindung(
    state: Arc<SignalingState>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    _platz: VerbindungsPlatz,
) {
    let framed = Framed::new(
        stream,
        ServerCodec::with_max_size(state.config.max_frame_groesse),
    );
    let (ausgang, eingang) = framed.split();

    // InvalidData kommt vom Codec (kaputtes JSON, Frame zu gross)
    let eingang = eingang.map(|frame| {
        frame.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => EingangsFehler::Ungueltig(e.to_string()),
            _ => EingangsFehler::Transport(e.to_string()),
        })
    });

    let peer = peer_addr.to_string();
    verbindung_bedienen(
        state.engine.clone(),
        eingang,
        ausgang,
        state.shutdown_rx.clone(),
        state.config.send_queue_groesse,
        &peer,
    )
    .await;
}

async fn ablehnen(stream: TcpStream, max_frame_groesse: usize) {
    let mut framed = Framed::new(stream, ServerCodec::with_max_size(max_frame_groesse));
    let _ = framed
        .send(ServerEvent::error(ErrorCode::ServerFull, "server full"))
        .await;
}
