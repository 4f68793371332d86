//! Warteschlange der Benutzer, die einen Gespraechspartner suchen
//!
//! FIFO, jede Kennung hoechstens einmal. Erneutes Einreihen entfernt den
//! alten Eintrag zuerst.

use randchat_core::types::{ConnectionId, UserId};
use std::collections::VecDeque;
use std::time::Instant;

/// Eintrag in der Warteschlange
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user: UserId,
    pub verbindung: ConnectionId,
    pub eingereiht: Instant,
}

impl QueueEntry {
    pub fn neu(user: UserId, verbindung: ConnectionId) -> Self {
        Self {
            user,
            verbindung,
            eingereiht: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WaitQueue {
    eintraege: VecDeque<QueueEntry>,
}

impl WaitQueue {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt an, nachdem ein bestehender Eintrag derselben Kennung entfernt wurde.
    /// Gibt die 1-basierte Position zurueck.
    pub fn einreihen(&mut self, eintrag: QueueEntry) -> usize {
        self.entfernen(&eintrag.user);
        self.eintraege.push_back(eintrag);
        self.eintraege.len()
    }

    /// Entfernt den Eintrag der Kennung; `false` wenn keiner vorhanden war
    pub fn entfernen(&mut self, user: &UserId) -> bool {
        let vorher = self.eintraege.len();
        self.eintraege.retain(|e| &e.user != user);
        self.eintraege.len() != vorher
    }

    /// Entnimmt die zwei aeltesten Eintraege
    pub fn paar_entnehmen(&mut self) -> Option<(QueueEntry, QueueEntry)> {
        if self.eintraege.len() < 2 {
            return None;
        }
        let erster = self.eintraege.pop_front()?;
        let zweiter = self.eintraege.pop_front()?;
        Some((erster, zweiter))
    }

    /// Stellt einen Eintrag wieder an die Spitze
    pub fn vorne_einfuegen(&mut self, eintrag: QueueEntry) {
        self.eintraege.push_front(eintrag);
    }

    pub fn position(&self, user: &UserId) -> Option<usize> {
        self.eintraege
            .iter()
            .position(|e| &e.user == user)
            .map(|i| i + 1)
    }

    pub fn enthaelt(&self, user: &UserId) -> bool {
        self.position(user).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.eintraege.iter()
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }

    /// Haengt ohne Deduplizierung an, um den Selbstpaarungs-Schutz zu testen
    #[cfg(test)]
    pub(crate) fn roh_anhaengen(&mut self, eintrag: QueueEntry) {
        self.eintraege.push_back(eintrag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eintrag(name: &str) -> QueueEntry {
        QueueEntry::neu(UserId::new(name), ConnectionId::new())
    }

    #[test]
    fn erneutes_einreihen_dedupliziert() {
        let mut q = WaitQueue::neu();
        q.einreihen(eintrag("a"));
        q.einreihen(eintrag("b"));
        let pos = q.einreihen(eintrag("a"));

        assert_eq!(q.len(), 2);
        assert_eq!(pos, 2);
        assert_eq!(q.position(&UserId::new("b")), Some(1));
    }

    #[test]
    fn fifo_reihenfolge() {
        let mut q = WaitQueue::neu();
        for name in ["a", "b", "c"] {
            q.einreihen(eintrag(name));
        }
        let (x, y) = q.paar_entnehmen().unwrap();
        assert_eq!(x.user.as_str(), "a");
        assert_eq!(y.user.as_str(), "b");
        assert!(q.paar_entnehmen().is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn entfernen_ohne_eintrag_ist_noop() {
        let mut q = WaitQueue::neu();
        assert!(!q.entfernen(&UserId::new("a")));
        q.einreihen(eintrag("a"));
        assert!(q.entfernen(&UserId::new("a")));
        assert!(q.is_empty());
    }

    #[test]
    fn keine_doppelten_kennungen_bei_beliebiger_folge() {
        let mut q = WaitQueue::neu();
        let namen = ["a", "b", "a", "c", "b", "a", "a", "d", "c"];
        for name in namen {
            q.einreihen(eintrag(name));
            let mut gesehen = std::collections::HashSet::new();
            for e in &q.eintraege {
                assert!(gesehen.insert(e.user.clone()), "doppelt: {}", e.user);
            }
        }
        assert_eq!(q.len(), 4);
    }
}
