//! Gemeinsamer Server-Zustand fuer das Signaling-Relay
//!
//! Haelt Konfiguration, Relay und Metriken als Arc-Referenzen, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use praxisruf_observability::PraxisrufMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::broadcast::DEFAULT_SEND_QUEUE_GROESSE;
use crate::relay::Relay;

/// Konfiguration fuer das Signaling-Relay
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige WebSocket-Verbindungen
    pub max_clients: u32,
    /// Keepalive-Intervall (WebSocket-Ping) in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Klingel-Timeout in Sekunden (0 = unbegrenzt klingeln)
    pub klingel_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Groesse einer eingehenden Nachricht in Bytes
    pub max_nachricht_groesse: usize,
}

impl SignalingConfig {
    /// Klingel-Timeout, `None` wenn deaktiviert
    pub fn klingel_timeout(&self) -> Option<Duration> {
        (self.klingel_timeout_sek > 0).then(|| Duration::from_secs(self.klingel_timeout_sek))
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Praxisruf".to_string(),
            max_clients: 256,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            klingel_timeout_sek: 0,
            send_queue_groesse: DEFAULT_SEND_QUEUE_GROESSE,
            max_nachricht_groesse: praxisruf_protocol::wire::DEFAULT_MAX_NACHRICHT_GROESSE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Registry, Sitzungen und Zustellung
    pub relay: Relay,
    pub metriken: PraxisrufMetrics,
    /// Freie Verbindungsplaetze (`max_clients` Permits)
    verbindungs_plaetze: Arc<Semaphore>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    pub fn neu(config: SignalingConfig, metriken: PraxisrufMetrics) -> Arc<Self> {
        let relay = Relay::neu(&config, metriken.clone());
        let plaetze = Semaphore::new(config.max_clients as usize);
        Arc::new(Self {
            config: Arc::new(config),
            relay,
            metriken,
            verbindungs_plaetze: Arc::new(plaetze),
            start_time: Instant::now(),
        })
    }

    pub fn uptime_sekunden(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Reserviert einen Verbindungsplatz, `None` wenn der Server voll ist
    ///
    /// Der Platz bleibt belegt bis das Permit gedroppt wird.
    pub fn platz_reservieren(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.verbindungs_plaetze).try_acquire_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klingel_timeout_null_ist_deaktiviert() {
        let config = SignalingConfig::default();
        assert!(config.klingel_timeout().is_none());

        let config = SignalingConfig {
            klingel_timeout_sek: 45,
            ..Default::default()
        };
        assert_eq!(config.klingel_timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn state_erstellen() {
        let state = SignalingState::neu(
            SignalingConfig::default(),
            PraxisrufMetrics::neu().unwrap(),
        );
        assert_eq!(state.relay.verbindungen(), 0);
        assert!(state.uptime_sekunden() < 5);
    }

    #[test]
    fn verbindungsplaetze_sind_begrenzt() {
        let config = SignalingConfig {
            max_clients: 2,
            ..Default::default()
        };
        let state = SignalingState::neu(config, PraxisrufMetrics::neu().unwrap());

        let erster = state.platz_reservieren().unwrap();
        let _zweiter = state.platz_reservieren().unwrap();
        assert!(state.platz_reservieren().is_none());

        drop(erster);
        assert!(state.platz_reservieren().is_some());
    }
}
