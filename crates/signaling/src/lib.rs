//! randchat-signaling – Vermittlung und Signaling-Relay
//!
//! Dieser Crate paart wartende Benutzer zufaellig zu Eins-zu-eins-Sessions
//! und leitet den WebRTC-Handshake (Offer, Answer, ICE) zwischen den
//! beiden Teilnehmern weiter. Medien laufen nie ueber den Server.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket (/ws)      TCP (SignalingServer)
//!        \                 /
//!         verbindung_bedienen (pro Verbindung ein Task)
//!                 |
//!                 v
//!        Engine (eine Task, besitzt den Zustand)
//!                 |
//!                 +-- Dispatcher   (Identitaet, Event -> Operation)
//!                 +-- MatchRegistry
//!                 |     +-- ConnectionDirectory (Kennung -> Send-Queue)
//!                 |     +-- WaitQueue          (FIFO, ohne Duplikate)
//!                 |     +-- SessionRegistry    (aktive Paare)
//!                 |     +-- UserStates         (Phase pro Kennung)
//!                 +-- PersistenzKanal (Verfuegbarkeit, best effort)
//! ```

pub mod connection;
pub mod directory;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod matchmaker;
pub mod persistence;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod server_state;
pub mod sessions;
pub mod tcp;
pub mod user_state;
pub mod ws;

// Bequeme Re-Exporte
pub use connection::{verbindung_bedienen, EingangsFehler};
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::{SignalingError, SignalingResult};
pub use registry::{MatchRegistry, RegistryStats};
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
pub use user_state::Phase;
pub use ws::ws_router;
