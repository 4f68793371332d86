//! randchat-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Events die zwischen Client und Server
//! ausgetauscht werden, sowie das Framing fuer TCP-Verbindungen.

pub mod control;
pub mod wire;

pub use control::{ClientEvent, ErrorCode, Role, ServerEvent};
pub use wire::{ClientCodec, FrameCodec, ServerCodec};
