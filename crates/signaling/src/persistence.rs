//! Verfuegbarkeits-Updates als Seitenkanal
//!
//! Die Engine legt Auftraege in eine Queue und wartet nie auf das Ergebnis.
//! Ein eigener Worker arbeitet sie der Reihe nach ab, damit z.B. "engaged"
//! nach "available" fuer dieselbe Kennung nicht ueberholt wird. Fehler
//! werden geloggt und gezaehlt, aber nie wiederholt.

use randchat_core::types::UserId;
use randchat_db::{UserStatus, UserStore};
use randchat_observability::MatchMetrics;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SignalingError;

/// Ein Update fuer den Benutzerspeicher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenzAuftrag {
    /// identify: Datensatz anlegen falls noetig, aktiv + verfuegbar
    Identifiziert(UserId),
    /// Paarung: beide beschaeftigt
    Gepaart(UserId, UserId),
    /// Session-Ende: wieder verfuegbar
    Frei(UserId),
    /// Verbindung weg: inaktiv
    Getrennt(UserId),
}

/// Sendeseite fuer die Engine
#[derive(Clone)]
pub struct PersistenzKanal {
    tx: Option<mpsc::Sender<PersistenzAuftrag>>,
    metriken: Option<MatchMetrics>,
}

impl PersistenzKanal {
    /// Startet den Worker. Ohne Store werden alle Auftraege verworfen.
    pub fn starten(
        store: Option<Arc<dyn UserStore>>,
        metriken: Option<MatchMetrics>,
        queue_groesse: usize,
    ) -> Self {
        let Some(store) = store else {
            return Self { tx: None, metriken };
        };

        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        tokio::spawn(worker(store, rx, metriken.clone()));
        Self {
            tx: Some(tx),
            metriken,
        }
    }

    /// Kanal ohne Store (Tests, reiner Signaling-Betrieb)
    pub fn deaktiviert() -> Self {
        Self {
            tx: None,
            metriken: None,
        }
    }

    /// Legt einen Auftrag ab, ohne zu warten
    pub fn senden(&self, auftrag: PersistenzAuftrag) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(auftrag) {
            tracing::warn!(fehler = %e, "Persistenz-Queue voll – Update verworfen");
            if let Some(m) = &self.metriken {
                m.persistence_failures_total.inc();
            }
        }
    }
}

async fn worker(
    store: Arc<dyn UserStore>,
    mut rx: mpsc::Receiver<PersistenzAuftrag>,
    metriken: Option<MatchMetrics>,
) {
    while let Some(auftrag) = rx.recv().await {
        if let Err(e) = ausfuehren(store.as_ref(), &auftrag).await {
            tracing::warn!(auftrag = ?auftrag, fehler = %e, "Verfuegbarkeits-Update fehlgeschlagen");
            if let Some(m) = &metriken {
                m.persistence_failures_total.inc();
            }
        }
    }
    tracing::debug!("Persistenz-Worker beendet");
}

/// Fuehrt einen Auftrag aus; bei `Gepaart` werden beide Updates versucht
pub async fn ausfuehren(
    store: &dyn UserStore,
    auftrag: &PersistenzAuftrag,
) -> Result<(), SignalingError> {
    let ergebnis = match auftrag {
        PersistenzAuftrag::Identifiziert(id) => match store.sicherstellen(id).await {
            Ok(()) => store.set_availability(id, true, UserStatus::Available).await,
            Err(e) => Err(e),
        },
        PersistenzAuftrag::Gepaart(a, b) => {
            let ra = store.set_availability(a, true, UserStatus::Engaged).await;
            let rb = store.set_availability(b, true, UserStatus::Engaged).await;
            ra.and(rb)
        }
        PersistenzAuftrag::Frei(id) => store.set_availability(id, true, UserStatus::Available).await,
        PersistenzAuftrag::Getrennt(id) => {
            store.set_availability(id, false, UserStatus::Available).await
        }
    };
    ergebnis.map_err(|e| SignalingError::Persistenz(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use randchat_db::MemoryStore;

    #[tokio::test]
    async fn identifiziert_legt_datensatz_an() {
        let store = MemoryStore::new();
        let a = UserId::new("a");
        ausfuehren(&store, &PersistenzAuftrag::Identifiziert(a.clone()))
            .await
            .unwrap();
        assert!(store.get(&a).await.unwrap().unwrap().ist_verfuegbar());
    }

    #[tokio::test]
    async fn gepaart_und_getrennt() {
        let store = MemoryStore::new();
        let a = UserId::new("a");
        let b = UserId::new("b");
        store.sicherstellen(&a).await.unwrap();
        store.sicherstellen(&b).await.unwrap();

        ausfuehren(&store, &PersistenzAuftrag::Gepaart(a.clone(), b.clone()))
            .await
            .unwrap();
        assert_eq!(
            store.get(&b).await.unwrap().unwrap().status,
            UserStatus::Engaged
        );

        ausfuehren(&store, &PersistenzAuftrag::Getrennt(a.clone()))
            .await
            .unwrap();
        let record = store.get(&a).await.unwrap().unwrap();
        assert!(!record.active);
        assert_eq!(record.status, UserStatus::Available);
    }

    #[tokio::test]
    async fn unbekannte_kennung_ist_persistenzfehler() {
        let store = MemoryStore::new();
        let err = ausfuehren(&store, &PersistenzAuftrag::Frei(UserId::new("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Persistenz(_)));
    }

    #[tokio::test]
    async fn fehler_werden_gezaehlt() {
        let metriken = MatchMetrics::neu().unwrap();
        let store: Arc<dyn UserStore> = Arc::new(MemoryStore::new());
        let kanal = PersistenzKanal::starten(Some(store), Some(metriken.clone()), 8);

        kanal.senden(PersistenzAuftrag::Frei(UserId::new("unbekannt")));

        for _ in 0..50 {
            if metriken.persistence_failures_total.get() == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("Fehler wurde nicht gezaehlt");
    }
}
