//! WebSocket-Transport ueber einen echten axum-Server

use futures_util::{SinkExt, StreamExt};
use randchat_core::types::UserId;
use randchat_protocol::control::{IdentifyRequest, QueueRequest, SignalMessage};
use randchat_protocol::{ClientEvent, ErrorCode, Role, ServerEvent};
use randchat_signaling::{ws_router, Engine, EngineConfig, SignalingConfig, SignalingState};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn ws_server(max_clients: usize) -> (SocketAddr, watch::Sender<bool>) {
    let (engine, _task) = Engine::starten(EngineConfig::default(), None, None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = SignalingState::neu(
        SignalingConfig {
            max_clients,
            ..Default::default()
        },
        engine,
        shutdown_rx,
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ws_router(state)).await.unwrap();
    });
    (addr, shutdown_tx)
}

async fn verbinden(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket-Verbindung fehlgeschlagen");
    ws
}

async fn senden(ws: &mut WsClient, event: ClientEvent) {
    ws.send(Message::Text(event.to_json().unwrap())).await.unwrap();
}

/// Naechstes Event; Ping/Pong-Frames werden uebersprungen
async fn lesen(ws: &mut WsClient) -> ServerEvent {
    loop {
        let nachricht = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timeout")
            .expect("Verbindung geschlossen")
            .unwrap();
        match nachricht {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            andere => panic!("Unerwarteter Frame: {andere:?}"),
        }
    }
}

async fn identify_und_suchen(ws: &mut WsClient, name: &str) {
    senden(
        ws,
        ClientEvent::Identify(IdentifyRequest {
            display_name: UserId::new(name),
        }),
    )
    .await;
    senden(ws, ClientEvent::FindMatch(QueueRequest::default())).await;
}

#[tokio::test]
async fn paarung_und_offer_ueber_websocket() {
    let (addr, _shutdown) = ws_server(16).await;
    let mut a = verbinden(addr).await;
    let mut b = verbinden(addr).await;

    identify_und_suchen(&mut a, "a").await;
    assert_eq!(lesen(&mut a).await, ServerEvent::queued(1));

    identify_und_suchen(&mut b, "b").await;
    let session_id = match lesen(&mut a).await {
        ServerEvent::MatchFound(m) => {
            assert_eq!(m.role, Role::Initiator);
            assert_eq!(m.remote_user_id, UserId::new("b"));
            m.session_id
        }
        andere => panic!("Unerwartet: {andere:?}"),
    };
    assert_eq!(lesen(&mut b).await, ServerEvent::queued(2));
    assert!(matches!(lesen(&mut b).await, ServerEvent::MatchFound(m) if m.role == Role::Responder));

    let offer = SignalMessage {
        session_id,
        from: UserId::new("a"),
        to: Some(UserId::new("b")),
        body: json!({"type": "offer", "sdp": "v=0\r\n"}),
    };
    senden(&mut a, ClientEvent::Offer(offer.clone())).await;
    assert_eq!(lesen(&mut b).await, ServerEvent::Offer(offer));
}

#[tokio::test]
async fn kaputtes_json_haelt_verbindung_offen() {
    let (addr, _shutdown) = ws_server(16).await;
    let mut a = verbinden(addr).await;

    a.send(Message::Text("{kein json".into())).await.unwrap();
    match lesen(&mut a).await {
        ServerEvent::Error(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
        andere => panic!("Unerwartet: {andere:?}"),
    }

    identify_und_suchen(&mut a, "a").await;
    assert_eq!(lesen(&mut a).await, ServerEvent::queued(1));
}

#[tokio::test]
async fn voller_server_lehnt_upgrade_ab() {
    let (addr, _shutdown) = ws_server(1).await;
    let _a = verbinden(addr).await;

    let ergebnis = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
    match ergebnis {
        Err(tokio_tungstenite::tungstenite::Error::Http(antwort)) => {
            assert_eq!(antwort.status().as_u16(), 503);
        }
        andere => panic!("Unerwartet: {:?}", andere.map(|_| ())),
    }
}

#[tokio::test]
async fn shutdown_verabschiedet_websocket_clients() {
    let (addr, shutdown) = ws_server(16).await;
    let mut a = verbinden(addr).await;
    identify_und_suchen(&mut a, "a").await;
    assert_eq!(lesen(&mut a).await, ServerEvent::queued(1));

    shutdown.send(true).unwrap();
    match lesen(&mut a).await {
        ServerEvent::Error(e) => assert_eq!(e.code, ErrorCode::ShuttingDown),
        andere => panic!("Unerwartet: {andere:?}"),
    }
}
