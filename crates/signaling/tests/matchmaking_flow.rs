//! End-to-End-Ablaeufe ueber das Engine-Handle und den TCP-Transport

use futures_util::{SinkExt, StreamExt};
use randchat_core::types::{ConnectionId, SessionId, UserId};
use randchat_db::{MemoryStore, UserStatus, UserStore};
use randchat_observability::MatchMetrics;
use randchat_protocol::control::{
    ConnectionEstablishedRequest, EndSessionRequest, IdentifyRequest, MatchFound, PingMessage,
    QueueRequest, QueueState, RemoteUserClosedRequest, SessionEnded, SignalMessage,
};
use randchat_protocol::{ClientCodec, ClientEvent, ErrorCode, Role, ServerEvent};
use randchat_signaling::{
    Engine, EngineConfig, EngineHandle, SignalingConfig, SignalingServer, SignalingState,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

struct TestClient {
    user: UserId,
    verbindung: ConnectionId,
    rx: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    async fn senden(&self, engine: &EngineHandle, event: ClientEvent) {
        engine.nachricht(self.verbindung, event).await.unwrap();
    }

    /// Alles, was bis jetzt angekommen ist; `statistik` dient als Barriere
    async fn empfangen(&mut self, engine: &EngineHandle) -> Vec<ServerEvent> {
        engine.statistik().await.unwrap();
        let mut events = Vec::new();
        while let Ok(e) = self.rx.try_recv() {
            events.push(e);
        }
        events
    }
}

async fn anmelden(engine: &EngineHandle, name: &str) -> TestClient {
    let (tx, rx) = mpsc::channel(64);
    let verbindung = engine.oeffnen(tx).await.unwrap();
    engine
        .nachricht(
            verbindung,
            ClientEvent::Identify(IdentifyRequest {
                display_name: UserId::new(name),
            }),
        )
        .await
        .unwrap();
    TestClient {
        user: UserId::new(name),
        verbindung,
        rx,
    }
}

fn starten() -> EngineHandle {
    let (engine, _task) = Engine::starten(EngineConfig::default(), None, None);
    engine
}

fn find_match() -> ClientEvent {
    ClientEvent::FindMatch(QueueRequest::default())
}

fn match_found(events: &[ServerEvent]) -> Option<MatchFound> {
    events.iter().find_map(|e| match e {
        ServerEvent::MatchFound(m) => Some(m.clone()),
        _ => None,
    })
}

fn fehler_code(events: &[ServerEvent]) -> Option<ErrorCode> {
    events.iter().find_map(|e| match e {
        ServerEvent::Error(f) => Some(f.code),
        _ => None,
    })
}

fn signal(session_id: SessionId, from: &UserId, to: &UserId) -> SignalMessage {
    SignalMessage {
        session_id,
        from: from.clone(),
        to: Some(to.clone()),
        body: json!({"candidate": "candidate:1 1 UDP 2122252543 10.0.0.1 54321 typ host", "sdpMid": "0"}),
    }
}

async fn invarianten(engine: &EngineHandle) {
    engine.invarianten_pruefen().await.unwrap().unwrap();
}

/// Paart a und b, gibt die Session zurueck
async fn paaren(engine: &EngineHandle, a: &mut TestClient, b: &mut TestClient) -> SessionId {
    a.senden(engine, find_match()).await;
    b.senden(engine, find_match()).await;
    let ma = match_found(&a.empfangen(engine).await).unwrap();
    let mb = match_found(&b.empfangen(engine).await).unwrap();
    assert_eq!(ma.session_id, mb.session_id);
    ma.session_id
}

// ---------------------------------------------------------------------------
// Vermittlung
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reihenfolge_bestimmt_die_rollen() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;

    a.senden(&engine, find_match()).await;
    let events_a = a.empfangen(&engine).await;
    assert_eq!(events_a, vec![ServerEvent::queued(1)]);

    b.senden(&engine, find_match()).await;
    let ma = match_found(&a.empfangen(&engine).await).unwrap();
    let mb = match_found(&b.empfangen(&engine).await).unwrap();

    assert_eq!(ma.role, Role::Initiator);
    assert_eq!(ma.remote_user_id, b.user);
    assert_eq!(mb.role, Role::Responder);
    assert_eq!(mb.remote_user_id, a.user);
    assert_eq!(ma.session_id, mb.session_id);

    let stats = engine.statistik().await.unwrap();
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.queue_length, 0);
    invarianten(&engine).await;
}

#[tokio::test]
async fn verlassen_und_erneut_suchen() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;

    a.senden(&engine, find_match()).await;
    a.senden(&engine, ClientEvent::LeaveQueue(QueueRequest::default()))
        .await;
    let events = a.empfangen(&engine).await;
    match events.last() {
        Some(ServerEvent::QueueStatus(s)) => assert_eq!(s.status, QueueState::Idle),
        andere => panic!("Unerwartet: {andere:?}"),
    }

    b.senden(&engine, find_match()).await;
    assert_eq!(b.empfangen(&engine).await, vec![ServerEvent::queued(1)]);

    a.senden(&engine, find_match()).await;
    let ma = match_found(&a.empfangen(&engine).await).unwrap();
    let mb = match_found(&b.empfangen(&engine).await).unwrap();
    assert_eq!(ma.remote_user_id, b.user);
    assert_eq!(mb.role, Role::Initiator);

    let stats = engine.statistik().await.unwrap();
    assert_eq!(stats.queue_length, 0);
    assert_eq!(stats.active_sessions, 1);
    invarianten(&engine).await;
}

#[tokio::test]
async fn verlassen_nach_match_found_gibt_partner_frei() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let s1 = paaren(&engine, &mut a, &mut b).await;

    // a hat match-found noch nicht gesehen und bricht die Suche ab
    a.senden(&engine, ClientEvent::LeaveQueue(QueueRequest::default()))
        .await;

    let events_a = a.empfangen(&engine).await;
    assert!(matches!(
        events_a.as_slice(),
        [ServerEvent::QueueStatus(s)] if s.status == QueueState::Idle
    ));
    assert_eq!(
        b.empfangen(&engine).await,
        vec![ServerEvent::SessionEnded(SessionEnded {
            session_id: s1,
            reason: "peer-ended".into(),
            ended_by: a.user.clone(),
        })]
    );
    assert_eq!(engine.statistik().await.unwrap().active_sessions, 0);
    invarianten(&engine).await;

    // b kann sofort weitersuchen
    b.senden(&engine, find_match()).await;
    assert_eq!(b.empfangen(&engine).await, vec![ServerEvent::queued(1)]);
}

#[tokio::test]
async fn doppeltes_find_match_ist_already_active() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;

    a.senden(&engine, find_match()).await;
    a.senden(&engine, find_match()).await;
    let events = a.empfangen(&engine).await;
    assert_eq!(events[0], ServerEvent::queued(1));
    assert_eq!(fehler_code(&events), Some(ErrorCode::AlreadyActive));
    assert_eq!(engine.statistik().await.unwrap().queue_length, 1);
    invarianten(&engine).await;
}

#[tokio::test]
async fn next_beendet_und_paart_neu() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let mut c = anmelden(&engine, "c").await;
    let s1 = paaren(&engine, &mut a, &mut b).await;

    c.senden(&engine, find_match()).await;
    a.senden(
        &engine,
        ClientEvent::EndSession(EndSessionRequest {
            user_id: None,
            find_next: true,
        }),
    )
    .await;

    let events_b = b.empfangen(&engine).await;
    assert_eq!(
        events_b,
        vec![ServerEvent::SessionEnded(SessionEnded {
            session_id: s1,
            reason: "peer-ended".into(),
            ended_by: a.user.clone(),
        })]
    );

    let ma = match_found(&a.empfangen(&engine).await).unwrap();
    assert_eq!(ma.remote_user_id, c.user);
    assert_ne!(ma.session_id, s1);
    assert!(match_found(&c.empfangen(&engine).await).is_some());
    invarianten(&engine).await;
}

#[tokio::test]
async fn remote_user_closed_wie_end_session() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    paaren(&engine, &mut a, &mut b).await;

    b.senden(
        &engine,
        ClientEvent::RemoteUserClosed(RemoteUserClosedRequest {
            username: Some(b.user.clone()),
        }),
    )
    .await;

    let events_a = a.empfangen(&engine).await;
    assert!(matches!(events_a.as_slice(), [ServerEvent::SessionEnded(e)] if e.ended_by == b.user));
    let stats = engine.statistik().await.unwrap();
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.queue_length, 0);
    invarianten(&engine).await;
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_wird_unveraendert_weitergeleitet() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let sid = paaren(&engine, &mut a, &mut b).await;

    let offer = SignalMessage {
        session_id: sid,
        from: a.user.clone(),
        to: Some(b.user.clone()),
        body: json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"}),
    };
    a.senden(&engine, ClientEvent::Offer(offer.clone())).await;
    assert_eq!(b.empfangen(&engine).await, vec![ServerEvent::Offer(offer)]);

    let answer = SignalMessage {
        session_id: sid,
        from: b.user.clone(),
        to: Some(a.user.clone()),
        body: json!({"type": "answer", "sdp": "v=0\r\n"}),
    };
    b.senden(&engine, ClientEvent::Answer(answer.clone())).await;
    assert_eq!(a.empfangen(&engine).await, vec![ServerEvent::Answer(answer)]);

    let ice = signal(sid, &a.user, &b.user);
    a.senden(&engine, ClientEvent::IceCandidate(ice.clone())).await;
    assert_eq!(b.empfangen(&engine).await, vec![ServerEvent::IceCandidate(ice)]);

    for c in [&a, &b] {
        c.senden(
            &engine,
            ClientEvent::ConnectionEstablished(ConnectionEstablishedRequest {
                user_id: None,
                session_id: sid,
            }),
        )
        .await;
    }
    assert!(a.empfangen(&engine).await.is_empty());
    invarianten(&engine).await;
}

#[tokio::test]
async fn unbekannte_session_wird_nie_zugestellt() {
    let metriken = MatchMetrics::neu().unwrap();
    let (engine, _task) = Engine::starten(EngineConfig::default(), None, Some(metriken.clone()));
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    paaren(&engine, &mut a, &mut b).await;

    a.senden(
        &engine,
        ClientEvent::IceCandidate(signal(SessionId::new(), &a.user, &b.user)),
    )
    .await;

    assert!(a.empfangen(&engine).await.is_empty());
    assert!(b.empfangen(&engine).await.is_empty());
    assert_eq!(
        metriken
            .dropped_messages_total
            .with_label_values(&["protokoll"])
            .get(),
        1
    );
    assert_eq!(metriken.relayed_messages_total.get(), 0);
}

#[tokio::test]
async fn falscher_absender_wird_verworfen() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let sid = paaren(&engine, &mut a, &mut b).await;

    // a gibt sich als b aus
    a.senden(&engine, ClientEvent::Offer(signal(sid, &b.user, &a.user)))
        .await;
    assert!(a.empfangen(&engine).await.is_empty());
    assert!(b.empfangen(&engine).await.is_empty());
}

// ---------------------------------------------------------------------------
// Trennung und Identitaet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trennung_beendet_session_genau_einmal() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let s1 = paaren(&engine, &mut a, &mut b).await;

    engine.schliessen(a.verbindung).await;

    let events_b = b.empfangen(&engine).await;
    assert_eq!(
        events_b,
        vec![ServerEvent::SessionEnded(SessionEnded {
            session_id: s1,
            reason: "peer-disconnected".into(),
            ended_by: a.user.clone(),
        })]
    );
    let stats = engine.statistik().await.unwrap();
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.connected_users, 1);

    // spaeter ICE-Kandidat fuer S1
    b.senden(&engine, ClientEvent::IceCandidate(signal(s1, &b.user, &a.user)))
        .await;
    assert!(b.empfangen(&engine).await.is_empty());
    invarianten(&engine).await;
}

#[tokio::test]
async fn events_vor_identify_sind_not_identified() {
    let engine = starten();
    let (tx, mut rx) = mpsc::channel(8);
    let v = engine.oeffnen(tx).await.unwrap();

    engine.nachricht(v, find_match()).await.unwrap();
    engine
        .nachricht(v, ClientEvent::Ping(PingMessage { timestamp_ms: 42 }))
        .await
        .unwrap();
    engine.statistik().await.unwrap();

    match rx.try_recv().unwrap() {
        ServerEvent::Error(e) => assert_eq!(e.code, ErrorCode::NotIdentified),
        andere => panic!("Unerwartet: {andere:?}"),
    }
    match rx.try_recv().unwrap() {
        ServerEvent::Pong(p) => assert_eq!(p.echo_timestamp_ms, 42),
        andere => panic!("Unerwartet: {andere:?}"),
    }
    assert_eq!(engine.statistik().await.unwrap().queue_length, 0);
}

#[tokio::test]
async fn zweites_identify_mit_anderem_namen_abgelehnt() {
    let engine = starten();
    let mut a = anmelden(&engine, "a").await;
    a.senden(
        &engine,
        ClientEvent::Identify(IdentifyRequest {
            display_name: UserId::new("b"),
        }),
    )
    .await;
    assert_eq!(
        fehler_code(&a.empfangen(&engine).await),
        Some(ErrorCode::AlreadyIdentified)
    );
    assert_eq!(engine.statistik().await.unwrap().connected_users, 1);
}

#[tokio::test]
async fn reconnect_ersetzt_alte_verbindung() {
    let engine = starten();
    let mut a_alt = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    let s1 = paaren(&engine, &mut a_alt, &mut b).await;

    let mut a_neu = anmelden(&engine, "a").await;

    let events_b = b.empfangen(&engine).await;
    assert!(matches!(
        events_b.as_slice(),
        [ServerEvent::SessionEnded(e)] if e.session_id == s1 && e.ended_by == a_neu.user
    ));

    // Events der alten Verbindung zaehlen nicht mehr
    a_alt.senden(&engine, find_match()).await;
    assert!(a_alt.empfangen(&engine).await.is_empty());
    assert_eq!(engine.statistik().await.unwrap().queue_length, 0);

    // Schliessen der alten Verbindung raeumt die neue nicht ab
    engine.schliessen(a_alt.verbindung).await;
    a_neu.senden(&engine, find_match()).await;
    assert_eq!(a_neu.empfangen(&engine).await, vec![ServerEvent::queued(1)]);
    assert_eq!(engine.statistik().await.unwrap().connected_users, 2);
    invarianten(&engine).await;
}

#[tokio::test]
async fn viele_benutzer_halten_die_invarianten() {
    let engine = starten();
    let mut clients = Vec::new();
    for i in 0..12 {
        clients.push(anmelden(&engine, &format!("u{i}")).await);
    }

    for runde in 0..5 {
        for (i, c) in clients.iter().enumerate() {
            let event = match (i + runde) % 4 {
                0 | 1 => find_match(),
                2 => ClientEvent::EndSession(EndSessionRequest {
                    user_id: None,
                    find_next: runde % 2 == 0,
                }),
                _ => ClientEvent::LeaveQueue(QueueRequest::default()),
            };
            c.senden(&engine, event).await;
        }
        invarianten(&engine).await;
    }

    for c in clients.iter_mut() {
        for e in c.empfangen(&engine).await {
            if let ServerEvent::MatchFound(m) = e {
                assert_ne!(m.remote_user_id, c.user);
            }
        }
    }

    for c in &clients[..6] {
        engine.schliessen(c.verbindung).await;
    }
    invarianten(&engine).await;
    assert_eq!(engine.statistik().await.unwrap().connected_users, 6);
}

// ---------------------------------------------------------------------------
// Persistenz
// ---------------------------------------------------------------------------

async fn warten_bis<F, Fut>(mut bedingung: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if bedingung().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht erreicht");
}

#[tokio::test]
async fn verfuegbarkeit_folgt_dem_ablauf() {
    let store = MemoryStore::new();
    let (engine, _task) = Engine::starten(
        EngineConfig::default(),
        Some(Arc::new(store.clone()) as Arc<dyn UserStore>),
        None,
    );

    let mut a = anmelden(&engine, "a").await;
    let mut b = anmelden(&engine, "b").await;
    paaren(&engine, &mut a, &mut b).await;

    let s = store.clone();
    warten_bis(|| {
        let s = s.clone();
        async move {
            matches!(s.get(&UserId::new("b")).await, Ok(Some(r)) if r.status == UserStatus::Engaged)
        }
    })
    .await;

    engine.schliessen(a.verbindung).await;

    let s = store.clone();
    warten_bis(|| {
        let s = s.clone();
        async move {
            let a = s.get(&UserId::new("a")).await.ok().flatten();
            let b = s.get(&UserId::new("b")).await.ok().flatten();
            matches!(a, Some(r) if !r.active && r.status == UserStatus::Available)
                && matches!(b, Some(r) if r.active && r.status == UserStatus::Available)
        }
    })
    .await;
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

async fn tcp_server(max_clients: usize) -> (std::net::SocketAddr, watch::Sender<bool>) {
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
    tokio::spawn(SignalingServer::neu(state, addr).starten_mit_listener(listener));
    (addr, shutdown_tx)
}

async fn tcp_client(addr: std::net::SocketAddr) -> Framed<TcpStream, ClientCodec> {
    Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new())
}

async fn lesen(client: &mut Framed<TcpStream, ClientCodec>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Timeout")
        .expect("Verbindung geschlossen")
        .unwrap()
}

async fn tcp_identify_und_suchen(client: &mut Framed<TcpStream, ClientCodec>, name: &str) {
    client
        .send(ClientEvent::Identify(IdentifyRequest {
            display_name: UserId::new(name),
        }))
        .await
        .unwrap();
    client.send(find_match()).await.unwrap();
}

#[tokio::test]
async fn tcp_paarung_ende_zu_ende() {
    let (addr, _shutdown) = tcp_server(16).await;
    let mut a = tcp_client(addr).await;
    let mut b = tcp_client(addr).await;

    tcp_identify_und_suchen(&mut a, "a").await;
    assert_eq!(lesen(&mut a).await, ServerEvent::queued(1));

    tcp_identify_und_suchen(&mut b, "b").await;
    match lesen(&mut a).await {
        ServerEvent::MatchFound(m) => {
            assert_eq!(m.role, Role::Initiator);
            assert_eq!(m.remote_user_id, UserId::new("b"));
        }
        andere => panic!("Unerwartet: {andere:?}"),
    }

    // b: queued(2) vor match-found
    assert_eq!(lesen(&mut b).await, ServerEvent::queued(2));
    assert!(matches!(lesen(&mut b).await, ServerEvent::MatchFound(m) if m.role == Role::Responder));
}

#[tokio::test]
async fn tcp_server_voll_und_shutdown() {
    let (addr, shutdown) = tcp_server(1).await;
    let mut a = tcp_client(addr).await;
    tcp_identify_und_suchen(&mut a, "a").await;
    assert_eq!(lesen(&mut a).await, ServerEvent::queued(1));

    let mut b = tcp_client(addr).await;
    match lesen(&mut b).await {
        ServerEvent::Error(e) => assert_eq!(e.code, ErrorCode::ServerFull),
        andere => panic!("Unerwartet: {andere:?}"),
    }

    shutdown.send(true).unwrap();
    match lesen(&mut a).await {
        ServerEvent::Error(e) => assert_eq!(e.code, ErrorCode::ShuttingDown),
        andere => panic!("Unerwartet: {andere:?}"),
    }
}
