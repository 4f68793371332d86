//! randchat-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use config::ServerConfig;
use randchat_db::UserStore;
use randchat_observability::{HealthState, MatchMetrics};
use randchat_signaling::{Engine, SignalingServer, SignalingState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Intervall fuer den Store-Ping des Health-Checks
const DB_PING_INTERVALL: Duration = Duration::from_secs(10);

/// Alle verdrahteten Dienste, noch ohne gebundene Sockets
pub struct Dienste {
    pub router: Router,
    pub signaling: Arc<SignalingState>,
    pub store: Arc<dyn UserStore>,
    pub metriken: MatchMetrics,
    pub health: HealthState,
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Oeffnet den Store, startet die Engine und baut den Router
    pub async fn dienste_aufbauen(&self, shutdown_rx: watch::Receiver<bool>) -> Result<Dienste> {
        let db_config = self.config.datenbank_config()?;
        tracing::info!(backend = %db_config.backend, url = %db_config.url, "Benutzerspeicher wird geoeffnet");
        let store = randchat_db::oeffnen(&db_config)
            .await
            .context("Benutzerspeicher konnte nicht geoeffnet werden")?;

        let metriken = MatchMetrics::neu()?;
        let health = HealthState::neu();
        health.db_status_setzen(store.ping().await);

        let (engine, _engine_task) = Engine::starten(
            self.config.engine_config(),
            Some(Arc::clone(&store)),
            Some(metriken.clone()),
        );
        let signaling = SignalingState::neu(self.config.signaling_config(), engine, shutdown_rx);

        let router = routes::app_router(
            &self.config,
            Arc::clone(&signaling),
            Arc::clone(&store),
            metriken.clone(),
            health.clone(),
        );

        Ok(Dienste {
            router,
            signaling,
            store,
            metriken,
            health,
        })
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Benutzerspeicher oeffnen, Engine starten
    /// 2. TCP-Listener starten (falls Port gesetzt)
    /// 3. HTTP-Server starten (WebSocket, REST, Health, Metriken)
    /// 4. Auf Ctrl-C warten, dann alle Verbindungen schliessen
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            http = %self.config.http_bind_adresse(),
            tcp = %self.config.tcp_bind_adresse(),
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dienste = self.dienste_aufbauen(shutdown_rx.clone()).await?;

        tokio::spawn(db_ping(
            Arc::clone(&dienste.store),
            dienste.health.clone(),
            shutdown_rx.clone(),
        ));

        let tcp_task = if self.config.netzwerk.tcp_port != 0 {
            let listener = TcpListener::bind(self.config.tcp_bind_adresse())
                .await
                .with_context(|| format!("TCP-Bind auf {}", self.config.tcp_bind_adresse()))?;
            let server = SignalingServer::neu(Arc::clone(&dienste.signaling), listener.local_addr()?);
            Some(tokio::spawn(server.starten_mit_listener(listener)))
        } else {
            None
        };

        let http_listener = TcpListener::bind(self.config.http_bind_adresse())
            .await
            .with_context(|| format!("HTTP-Bind auf {}", self.config.http_bind_adresse()))?;
        tracing::info!(adresse = %http_listener.local_addr()?, "HTTP-Server gestartet");

        let mut http_shutdown = shutdown_rx.clone();
        let http_task = tokio::spawn(async move {
            axum::serve(http_listener, dienste.router)
                .with_graceful_shutdown(async move {
                    while http_shutdown.changed().await.is_ok() {
                        if *http_shutdown.borrow() {
                            break;
                        }
                    }
                })
                .await
        });

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        let _ = shutdown_tx.send(true);

        if let Some(task) = tcp_task {
            task.await??;
        }
        http_task.await??;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Haelt `db_connected` im Health-Check aktuell
async fn db_ping(store: Arc<dyn UserStore>, health: HealthState, mut shutdown_rx: watch::Receiver<bool>) {
    let mut intervall = tokio::time::interval(DB_PING_INTERVALL);
    loop {
        tokio::select! {
            _ = intervall.tick() => {
                let verbunden = store.ping().await;
                if verbunden != health.db_verbunden() {
                    tracing::warn!(verbunden, "Store-Status geaendert");
                }
                health.db_status_setzen(verbunden);
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
