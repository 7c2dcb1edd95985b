//! praxisruf-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use praxisruf_observability::{observability_server_starten, HealthState, PraxisrufMetrics};
use praxisruf_signaling::{SignalingServer, SignalingState};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.ws_bind_adresse()?)
            .await
            .context("WebSocket-Port konnte nicht gebunden werden")?;
        self.mit_listener(listener, async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
            }
        })
        .await
    }

    /// Startet alle Subsysteme auf einem bereits gebundenen Listener
    ///
    /// Reihenfolge:
    /// 1. Metriken und Relay-Zustand anlegen
    /// 2. WebSocket-Server (`/ws`, `/api/users`) starten
    /// 3. Observability-Server (`/metrics`, `/health`) starten, falls aktiviert
    /// 4. Klingel-Ueberwachung starten
    /// 5. Auf `stopp` warten, dann alle Tasks ueber den watch-Kanal beenden
    pub async fn mit_listener<F>(self, listener: TcpListener, stopp: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let metriken = PraxisrufMetrics::neu()?;
        let state = SignalingState::neu(self.config.signaling_config(), metriken.clone());
        let relay = state.relay.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            server_name = %self.config.server.name,
            ws = %listener.local_addr()?,
            max_clients = self.config.server.max_clients,
            klingel_timeout_sek = self.config.signaling.klingel_timeout_sek,
            "Server startet"
        );

        let signaling_server = SignalingServer::neu(Arc::clone(&state));
        let signaling_rx = shutdown_rx.clone();
        let signaling_task = tokio::spawn(async move {
            if let Err(e) = signaling_server.mit_listener(listener, signaling_rx).await {
                tracing::error!(fehler = %e, "WebSocket-Server beendet mit Fehler");
            }
        });

        let health = HealthState::neu(Arc::new(relay.clone()));
        let observability_task = if self.config.observability.aktiviert {
            let addr = self.config.observability_bind_adresse()?;
            let health = health.clone();
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet mit Fehler");
                }
            }))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let klingel_task = tokio::spawn(relay.klingel_timeouts_ueberwachen(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        stopp.await;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        health.bereit_setzen(false);
        // Alle Empfaenger koennen bereits weg sein, dann ist nichts zu tun
        let _ = shutdown_tx.send(true);

        let _ = signaling_task.await;
        if let Some(task) = observability_task {
            let _ = task.await;
        }
        let _ = klingel_task.await;

        tracing::info!(
            uptime_sek = state.uptime_sekunden(),
            "Server beendet"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn server_startet_und_stoppt() {
        let mut config = ServerConfig::default();
        config.observability.aktiviert = false;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stopp_tx, stopp_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(Server::neu(config).mit_listener(listener, async move {
            let _ = stopp_rx.await;
        }));

        // Port nimmt Verbindungen an
        let verbindung = tokio::net::TcpStream::connect(addr).await;
        assert!(verbindung.is_ok());
        drop(verbindung);

        stopp_tx.send(()).unwrap();
        let ergebnis = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("Server muss nach dem Stopp-Signal enden")
            .unwrap();
        assert!(ergebnis.is_ok());
    }
}
