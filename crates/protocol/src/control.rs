//! Signaling-Protokoll (WebSocket und TCP)
//!
//! Definiert alle Nachrichten die zwischen Browser-Client und Server
//! ausgetauscht werden.
//!
//! ## Design
//! - Ereignis-basiert: kein Request/Response, jede Seite sendet Events
//! - JSON-Serialisierung via serde, Tagged Enums mit Feld `type`
//! - Handshake-Inhalte (SDP, ICE) bleiben opakes JSON und werden nie
//!   vom Server interpretiert

use randchat_core::types::{SessionId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InvalidRequest,
    // Identitaet
    NotIdentified,
    AlreadyIdentified,
    // Matchmaking
    AlreadyActive,
    // Server
    ServerFull,
    ShuttingDown,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Verbindungsaufbau: bindet die Verbindung an eine Benutzer-Kennung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyRequest {
    /// Stabile Kennung des Clients (im Browser in localStorage abgelegt)
    pub display_name: UserId,
}

/// find-match / leave-queue
///
/// `user_id` ist optional; fehlt sie, gilt die Identitaet der Verbindung.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Offer, Answer oder ICE-Kandidat
///
/// Wird unveraendert an den anderen Teilnehmer der Session weitergeleitet,
/// daher identisch fuer beide Richtungen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub session_id: SessionId,
    pub from: UserId,
    #[serde(default)]
    pub to: Option<UserId>,
    /// SDP bzw. ICE-Kandidat, opak
    pub body: serde_json::Value,
}

/// Client meldet eine stehende Peer-Verbindung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEstablishedRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub session_id: SessionId,
}

/// Session beenden, optional direkt wieder einreihen ("Next")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub find_next: bool,
}

/// Altes Event aelterer Clients, entspricht `end-session` ohne Next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteUserClosedRequest {
    #[serde(default)]
    pub username: Option<UserId>,
}

/// Ping (Client -> Server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Alle eingehenden Events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    Identify(IdentifyRequest),
    FindMatch(QueueRequest),
    LeaveQueue(QueueRequest),
    Offer(SignalMessage),
    Answer(SignalMessage),
    IceCandidate(SignalMessage),
    ConnectionEstablished(ConnectionEstablishedRequest),
    EndSession(EndSessionRequest),
    RemoteUserClosed(RemoteUserClosedRequest),
    Ping(PingMessage),
}

impl ClientEvent {
    /// Name des Events fuer Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::FindMatch(_) => "find-match",
            Self::LeaveQueue(_) => "leave-queue",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::ConnectionEstablished(_) => "connection-established",
            Self::EndSession(_) => "end-session",
            Self::RemoteUserClosed(_) => "remote-user-closed",
            Self::Ping(_) => "ping",
        }
    }

    /// Deserialisiert ein Event aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialisiert das Event als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Warteschlangen-Zustand aus Sicht des Clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    Idle,
}

/// Antwort auf find-match / leave-queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub status: QueueState,
    pub message: String,
    /// 1-basierte Position in der Warteschlange (nur bei `queued`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Rolle im WebRTC-Handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Erstellt das Offer
    Initiator,
    /// Wartet auf das Offer
    Responder,
}

/// Paarung gefunden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFound {
    pub session_id: SessionId,
    pub remote_user_id: UserId,
    pub role: Role,
}

/// Session wurde beendet (vom Gegenueber oder durch Verbindungsabbruch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub session_id: SessionId,
    pub reason: String,
    pub ended_by: UserId,
}

/// Fehler-Event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

/// Alle ausgehenden Events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    QueueStatus(QueueStatus),
    MatchFound(MatchFound),
    Offer(SignalMessage),
    Answer(SignalMessage),
    IceCandidate(SignalMessage),
    SessionEnded(SessionEnded),
    Error(ErrorResponse),
    Pong(PongMessage),
}

impl ServerEvent {
    /// Erstellt ein Fehler-Event
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// queue-status `queued`
    pub fn queued(position: usize) -> Self {
        Self::QueueStatus(QueueStatus {
            status: QueueState::Queued,
            message: "Looking for someone to chat with...".to_string(),
            queue_position: Some(position),
        })
    }

    /// queue-status `idle`
    pub fn idle(message: impl Into<String>) -> Self {
        Self::QueueStatus(QueueStatus {
            status: QueueState::Idle,
            message: message.into(),
            queue_position: None,
        })
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::Pong(PongMessage {
            echo_timestamp_ms,
            server_timestamp_ms,
        })
    }

    /// Serialisiert das Event als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert ein Event aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
