//! WebSocket-Transport (`GET /ws`)
//!
//! Ein Text-Frame ist genau ein JSON-Event. Binaer-Frames werden ebenfalls
//! als JSON gelesen, Antworten gehen immer als Text-Frame raus.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{future, SinkExt, StreamExt};
use randchat_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;

use crate::connection::{verbindung_bedienen, EingangsFehler};
use crate::server_state::{SignalingState, VerbindungsPlatz};

/// Router mit der Upgrade-Route
pub fn ws_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
) -> Response {
    let Some(platz) = state.verbindungs_platz() else {
        tracing::warn!(max = state.config.max_clients, "Server voll, WebSocket abgelehnt");
        return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
    };

    ws.max_message_size(state.config.max_frame_groesse)
        .on_upgrade(move |socket| ws_verbindung(state, socket, platz))
}

async fn ws_verbindung(state: Arc<SignalingState>, socket: WebSocket, _platz: VerbindungsPlatz) {
    let (ausgang, eingang) = socket.split();

    let eingang = eingang.filter_map(|nachricht| future::ready(nachricht_lesen(nachricht)));
    let ausgang = ausgang.with(|event: ServerEvent| {
        future::ready(
            event
                .to_json()
                .map(Message::Text)
                .map_err(axum::Error::new),
        )
    });

    verbindung_bedienen(
        state.engine.clone(),
        eingang,
        ausgang,
        state.shutdown_rx.clone(),
        state.config.send_queue_groesse,
        "websocket",
    )
    .await;
}

/// `None` fuer Frames ohne Event (Ping/Pong beantwortet axum selbst)
fn nachricht_lesen(
    nachricht: Result<Message, axum::Error>,
) -> Option<Result<ClientEvent, EingangsFehler>> {
    match nachricht {
        Ok(Message::Text(text)) => {
            Some(ClientEvent::from_json(&text).map_err(|e| EingangsFehler::Ungueltig(e.to_string())))
        }
        Ok(Message::Binary(daten)) => Some(
            serde_json::from_slice::<ClientEvent>(&daten)
                .map_err(|e| EingangsFehler::Ungueltig(e.to_string())),
        ),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Err(EingangsFehler::Transport("Close-Frame".into()))),
        Err(e) => Some(Err(EingangsFehler::Transport(e.to_string()))),
    }
}
