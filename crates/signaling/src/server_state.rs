//! Gemeinsamer Zustand der Transporte
//!
//! Die Transporte teilen sich das Engine-Handle, das Shutdown-Signal und
//! den Zaehler offener Verbindungen. Der Vermittlungszustand selbst liegt
//! ausschliesslich in der Engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::engine::EngineHandle;

/// Konfiguration der Transporte
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige Verbindungen (WS + TCP)
    pub max_clients: usize,
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Groesse eines Frames bzw. einer WS-Nachricht
    pub max_frame_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_clients: 1024,
            send_queue_groesse: 64,
            max_frame_groesse: randchat_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    pub engine: EngineHandle,
    pub shutdown_rx: watch::Receiver<bool>,
    verbindungen: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl SignalingState {
    pub fn neu(
        config: SignalingConfig,
        engine: EngineHandle,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            engine,
            shutdown_rx,
            verbindungen: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz, `None` wenn der Server voll ist
    pub fn verbindungs_platz(&self) -> Option<VerbindungsPlatz> {
        let max = self.config.max_clients;
        self.verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                zaehler: Arc::clone(&self.verbindungen),
            })
    }

    pub fn aktive_verbindungen(&self) -> usize {
        self.verbindungen.load(Ordering::Acquire)
    }

    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Belegter Verbindungsplatz, wird beim Drop freigegeben
#[derive(Debug)]
pub struct VerbindungsPlatz {
    zaehler: Arc<AtomicUsize>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.zaehler.fetch_sub(1, Ordering::AcqRel);
    }
}
