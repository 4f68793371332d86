//! In-Memory-Backend fuer Benutzer-Datensaetze
//!
//! Standard-Backend. Alle Daten gehen beim Neustart verloren, was fuer
//! einen Zufalls-Chat ohne Konten keine Rolle spielt.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use randchat_core::types::UserId;
use std::sync::Arc;

use crate::error::DbError;
use crate::models::{AvailabilityUpdate, UserRecord};
use crate::repository::{DbResult, UserStore};

/// Benutzer-Store auf Basis einer DashMap
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    benutzer: Arc<DashMap<UserId, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anzahl(&self) -> usize {
        self.benutzer.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self) -> DbResult<UserId> {
        let id = UserId::zufaellig();
        self.benutzer
            .insert(id.clone(), UserRecord::neu(id.clone()));
        Ok(id)
    }

    async fn sicherstellen(&self, id: &UserId) -> DbResult<()> {
        self.benutzer
            .entry(id.clone())
            .or_insert_with(|| UserRecord::neu(id.clone()));
        Ok(())
    }

    async fn get(&self, id: &UserId) -> DbResult<Option<UserRecord>> {
        Ok(self.benutzer.get(id).map(|r| r.value().clone()))
    }

    async fn aktualisieren(&self, id: &UserId, update: AvailabilityUpdate) -> DbResult<()> {
        let mut eintrag = self
            .benutzer
            .get_mut(id)
            .ok_or_else(|| DbError::nicht_gefunden(format!("User {id}")))?;
        update.anwenden(eintrag.value_mut());
        Ok(())
    }

    async fn find_random_available_peer(&self, excluding: &UserId) -> DbResult<Option<UserId>> {
        let kandidaten: Vec<UserId> = self
            .benutzer
            .iter()
            .filter(|e| e.key() != excluding && e.value().ist_verfuegbar())
            .map(|e| e.key().clone())
            .collect();

        Ok(kandidaten.choose(&mut rand::thread_rng()).cloned())
    }

    async fn anzahl_verfuegbar(&self) -> DbResult<u64> {
        Ok(self
            .benutzer
            .iter()
            .filter(|e| e.value().ist_verfuegbar())
            .count() as u64)
    }
}
