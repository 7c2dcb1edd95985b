//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Context};
use praxisruf_observability::logging::{log_format_gueltig, log_level_gueltig};
use praxisruf_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Keepalive, Timeouts, Queues)
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger WebSocket-Verbindungen
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Praxisruf".into(),
            max_clients: 256,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer WebSocket (`/ws`) und REST-Spiegel (`/api/users`)
    pub ws_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 3000,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Intervall fuer WebSocket-Pings in Sekunden
    pub keepalive_sek: u64,
    /// Verbindung ohne empfangenen Frame wird nach dieser Zeit getrennt
    pub verbindungs_timeout_sek: u64,
    /// Klingelnde Anrufe werden nach dieser Zeit beendet (0 = nie)
    pub klingel_timeout_sek: u64,
    /// Ausgehende Nachrichten pro Verbindung, bevor sie verworfen wird
    pub send_queue_groesse: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let basis = SignalingConfig::default();
        Self {
            keepalive_sek: basis.keepalive_sek,
            verbindungs_timeout_sek: basis.verbindungs_timeout_sek,
            klingel_timeout_sek: basis.klingel_timeout_sek,
            send_queue_groesse: basis.send_queue_groesse,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

/// Woher die geladene Konfiguration stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quelle {
    Datei,
    /// Datei fehlte, es gelten die Standardwerte
    Standardwerte,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    ///
    /// Fehlt die Datei, gelten die Standardwerte. Die Quelle wird mit
    /// zurueckgegeben, weil beim Laden noch kein Logging aktiv ist.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, Quelle)> {
        let (config, quelle) = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => (
                Self::aus_toml(&inhalt)
                    .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
                Quelle::Datei,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), Quelle::Standardwerte)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.validieren()?;
        Ok((config, quelle))
    }

    /// Parst einen TOML-String (ohne Validierung)
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.server.max_clients == 0 {
            bail!("server.max_clients muss groesser als 0 sein");
        }
        if self.signaling.send_queue_groesse == 0 {
            bail!("signaling.send_queue_groesse muss groesser als 0 sein");
        }
        if self.signaling.verbindungs_timeout_sek <= self.signaling.keepalive_sek {
            bail!(
                "signaling.verbindungs_timeout_sek ({}) muss groesser als keepalive_sek ({}) sein",
                self.signaling.verbindungs_timeout_sek,
                self.signaling.keepalive_sek
            );
        }
        self.ws_bind_adresse()?;
        if self.observability.aktiviert {
            if self.observability.port == self.netzwerk.ws_port {
                bail!("observability.port und netzwerk.ws_port muessen verschieden sein");
            }
            self.observability_bind_adresse()?;
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer WebSocket und REST-Spiegel zurueck
    pub fn ws_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Self::adresse(&self.netzwerk.bind_adresse, self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Self::adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Relay-Konfiguration aus den Abschnitten `[server]` und `[signaling]`
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            klingel_timeout_sek: self.signaling.klingel_timeout_sek,
            send_queue_groesse: self.signaling.send_queue_groesse,
            ..SignalingConfig::default()
        }
    }

    fn adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.server.max_clients, 256);
        assert_eq!(cfg.netzwerk.ws_port, 3000);
        assert_eq!(cfg.signaling.klingel_timeout_sek, 0);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_adresse().unwrap().to_string(), "0.0.0.0:3000");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Praxis Dr. Berger"
            max_clients = 40

            [signaling]
            klingel_timeout_sek = 45
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Praxis Dr. Berger");
        assert_eq!(cfg.server.max_clients, 40);
        assert_eq!(cfg.signaling.klingel_timeout_sek, 45);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_port, 3000);
        assert_eq!(cfg.signaling.keepalive_sek, 30);
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_clients = 12;
        cfg.signaling.klingel_timeout_sek = 20;
        cfg.signaling.send_queue_groesse = 8;

        let sig = cfg.signaling_config();
        assert_eq!(sig.max_clients, 12);
        assert_eq!(sig.send_queue_groesse, 8);
        assert_eq!(sig.klingel_timeout(), Some(std::time::Duration::from_secs(20)));
        assert_eq!(sig.server_name, "Praxisruf");
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.signaling.verbindungs_timeout_sek = 10;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.observability.port = 3000;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn portkonflikt_egal_wenn_observability_aus() {
        let mut cfg = ServerConfig::default();
        cfg.observability.aktiviert = false;
        cfg.observability.port = 3000;
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let (cfg, quelle) = ServerConfig::laden("/nicht/vorhanden/praxisruf.toml").unwrap();
        assert_eq!(quelle, Quelle::Standardwerte);
        assert_eq!(cfg.netzwerk.ws_port, 3000);
    }

    #[test]
    fn vorhandene_datei_wird_gelesen() {
        let pfad = std::env::temp_dir().join(format!("praxisruf-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[netzwerk]\nws_port = 4000\n").unwrap();

        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        let _ = std::fs::remove_file(&pfad);

        let (cfg, quelle) = ergebnis.unwrap();
        assert_eq!(quelle, Quelle::Datei);
        assert_eq!(cfg.netzwerk.ws_port, 4000);
    }

    #[test]
    fn unbekannter_typ_in_toml_ist_fehler() {
        assert!(ServerConfig::aus_toml("[netzwerk]\nws_port = \"dreitausend\"").is_err());
    }
}
