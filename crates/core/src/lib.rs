//! randchat-core – Gemeinsame Typen
//!
//! Identifikationstypen, die von allen anderen randchat-Crates gemeinsam
//! genutzt werden. Fehlertypen definiert jedes Crate selbst (`DbError`,
//! `SignalingError`), an der Binary-Grenze uebernimmt `anyhow`.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ConnectionId, SessionId, UserId};
