//! Fehlertypen fuer den Signaling-Service
//!
//! Keiner dieser Fehler ist fuer den Prozess fatal. Die Engine entscheidet
//! pro Variante, ob der Client ein Error-Event bekommt oder die Nachricht
//! nur protokolliert und verworfen wird.

use randchat_core::types::UserId;
use randchat_protocol::ErrorCode;
use thiserror::Error;

use crate::user_state::Phase;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Unbekannte oder fremde Session, falscher Absender
    #[error("Protokollverletzung: {0}")]
    ProtokollVerletzung(String),

    /// Aktion ist im aktuellen Zustand des Benutzers nicht erlaubt
    #[error("Ungueltiger Zustandswechsel fuer {user}: {von} -> {nach}")]
    UngueltigerUebergang { user: UserId, von: Phase, nach: Phase },

    /// Gegenueber hat keine aktive Verbindung mehr
    #[error("Peer nicht erreichbar: {0}")]
    PeerNichtErreichbar(UserId),

    /// Benutzerspeicher hat ein Update abgelehnt
    #[error("Persistenzfehler: {0}")]
    Persistenz(String),

    /// Senden an Client oder Engine fehlgeschlagen (Channel geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,
}

impl SignalingError {
    /// Erstellt eine Protokollverletzung
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::ProtokollVerletzung(msg.into())
    }

    /// Fehler-Code fuer den Client, `None` wenn still verworfen wird
    pub fn fehler_code(&self) -> Option<ErrorCode> {
        match self {
            Self::UngueltigerUebergang { nach, .. } if *nach == Phase::Queued => {
                Some(ErrorCode::AlreadyActive)
            }
            Self::UngueltigerUebergang { .. } => Some(ErrorCode::InvalidRequest),
            Self::ProtokollVerletzung(_)
            | Self::PeerNichtErreichbar(_)
            | Self::Persistenz(_)
            | Self::SendFehler => None,
        }
    }

    /// Label fuer `randchat_dropped_messages_total`
    pub fn verwurf_grund(&self) -> &'static str {
        match self {
            Self::ProtokollVerletzung(_) => "protokoll",
            Self::PeerNichtErreichbar(_) => "peer_fehlt",
            Self::UngueltigerUebergang { .. } => "zustand",
            Self::SendFehler => "send_queue",
            Self::Persistenz(_) => "persistenz",
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
