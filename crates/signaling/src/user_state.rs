//! Zustandsautomat pro Benutzer
//!
//! ```text
//! idle -> queued -> matched -> in-call
//!   ^       |          |          |
//!   +-------+----------+----------+
//! ```
//!
//! Alle Wechsel laufen ueber [`UserStates::wechseln`], das gegen die
//! Tabelle in [`Phase::darf_wechseln`] prueft.

use randchat_core::types::{ConnectionId, SessionId, UserId};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{SignalingError, SignalingResult};

/// Phase eines Benutzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Queued,
    Matched,
    InCall,
}

impl Phase {
    /// Zentrale Uebergangstabelle
    pub fn darf_wechseln(self, nach: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, nach),
            (Idle, Queued)
                | (Queued, Idle)
                | (Queued, Matched)
                | (Matched, InCall)
                | (Matched, Idle)
                | (InCall, Idle)
        )
    }

    /// Phasen mit Session-Bezug
    pub fn hat_session(self) -> bool {
        matches!(self, Phase::Matched | Phase::InCall)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Queued => "queued",
            Phase::Matched => "matched",
            Phase::InCall => "in-call",
        };
        f.write_str(s)
    }
}

/// Zustand eines verbundenen Benutzers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserState {
    pub phase: Phase,
    /// Gesetzt genau dann wenn `phase` matched oder in-call ist
    pub session: Option<SessionId>,
    pub verbindung: ConnectionId,
}

/// Zustaende aller verbundenen Benutzer
#[derive(Debug, Default)]
pub struct UserStates {
    zustaende: HashMap<UserId, UserState>,
}

impl UserStates {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt den Benutzer als idle an (ueberschreibt einen alten Eintrag)
    pub fn anlegen(&mut self, user: UserId, verbindung: ConnectionId) {
        self.zustaende.insert(
            user,
            UserState {
                phase: Phase::Idle,
                session: None,
                verbindung,
            },
        );
    }

    pub fn get(&self, user: &UserId) -> Option<&UserState> {
        self.zustaende.get(user)
    }

    pub fn phase(&self, user: &UserId) -> Option<Phase> {
        self.zustaende.get(user).map(|z| z.phase)
    }

    /// Prueft den Wechsel ohne ihn auszufuehren
    pub fn pruefen(&self, user: &UserId, nach: Phase) -> SignalingResult<()> {
        let von = self
            .phase(user)
            .ok_or_else(|| SignalingError::protokoll(format!("Kein Zustand fuer {user}")))?;
        if von.darf_wechseln(nach) {
            Ok(())
        } else {
            Err(SignalingError::UngueltigerUebergang {
                user: user.clone(),
                von,
                nach,
            })
        }
    }

    /// Fuehrt einen Wechsel aus; `session` wird nur in matched/in-call gehalten
    pub fn wechseln(
        &mut self,
        user: &UserId,
        nach: Phase,
        session: Option<SessionId>,
    ) -> SignalingResult<()> {
        self.pruefen(user, nach)?;
        if let Some(zustand) = self.zustaende.get_mut(user) {
            zustand.phase = nach;
            zustand.session = if nach.hat_session() {
                session.or(zustand.session)
            } else {
                None
            };
            tracing::trace!(user_id = %user, phase = %nach, "Zustandswechsel");
        }
        Ok(())
    }

    pub fn entfernen(&mut self, user: &UserId) -> Option<UserState> {
        self.zustaende.remove(user)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &UserState)> {
        self.zustaende.iter()
    }

    pub fn len(&self) -> usize {
        self.zustaende.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zustaende.is_empty()
    }
}
