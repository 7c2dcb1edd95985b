//! Structured Logging Setup via tracing-subscriber
//!
//! Quellen in absteigender Prioritaet:
//! 1. `PRAXISRUF_LOG_LEVEL` (beliebige EnvFilter-Direktive) und
//!    `PRAXISRUF_LOG_FORMAT` (`text`/`json`)
//! 2. Abschnitt `[logging]` der Konfigurationsdatei
//!
//! Ein Level aus der Konfigurationsdatei daempft zusaetzlich hyper auf
//! `warn`, sonst flutet jeder WebSocket-Frame das Debug-Log.

use anyhow::anyhow;
use tracing_subscriber::{fmt, EnvFilter};

/// Direktiven, die an ein Level aus der Konfigurationsdatei angehaengt werden
const LEISE_CRATES: &str = "hyper=warn,hyper_util=warn";

/// Aufgeloeste Logging-Einstellungen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEinstellungen {
    /// EnvFilter-Direktive
    pub filter: String,
    pub json: bool,
}

impl LogEinstellungen {
    /// Kombiniert Umgebung und Konfigurationsdatei
    ///
    /// Leere Umgebungswerte zaehlen als nicht gesetzt.
    pub fn aufloesen(
        config_level: &str,
        config_format: &str,
        env_level: Option<&str>,
        env_format: Option<&str>,
    ) -> Self {
        let filter = match env_level.map(str::trim).filter(|l| !l.is_empty()) {
            Some(direktive) => direktive.to_string(),
            None => format!("{config_level},{LEISE_CRATES}"),
        };
        let format = env_format
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(config_format);
        Self {
            filter,
            json: format.eq_ignore_ascii_case("json"),
        }
    }

    /// Liest `PRAXISRUF_LOG_LEVEL` und `PRAXISRUF_LOG_FORMAT`
    pub fn aus_umgebung(config_level: &str, config_format: &str) -> Self {
        let env_level = std::env::var("PRAXISRUF_LOG_LEVEL").ok();
        let env_format = std::env::var("PRAXISRUF_LOG_FORMAT").ok();
        Self::aufloesen(
            config_level,
            config_format,
            env_level.as_deref(),
            env_format.as_deref(),
        )
    }
}

/// Initialisiert das Logging-System.
///
/// Schlaegt fehl bei ungueltiger Direktive oder wenn bereits ein globaler
/// Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let einstellungen = LogEinstellungen::aus_umgebung(level, format);
    let filter = EnvFilter::try_new(&einstellungen.filter)
        .map_err(|e| anyhow!("Ungueltiger Log-Filter '{}': {e}", einstellungen.filter))?;

    let ergebnis = if einstellungen.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };
    ergebnis.map_err(|e| anyhow!("Logging bereits initialisiert: {e}"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn konfigurationsdatei_ohne_umgebung() {
        let e = LogEinstellungen::aufloesen("debug", "text", None, None);
        assert_eq!(e.filter, "debug,hyper=warn,hyper_util=warn");
        assert!(!e.json);
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let e = LogEinstellungen::aufloesen(
            "info",
            "text",
            Some("praxisruf_signaling=trace"),
            Some("json"),
        );
        assert_eq!(e.filter, "praxisruf_signaling=trace");
        assert!(e.json);
    }

    #[test]
    fn leere_umgebung_zaehlt_nicht() {
        let e = LogEinstellungen::aufloesen("warn", "json", Some("  "), Some(""));
        assert!(e.filter.starts_with("warn,"));
        assert!(e.json);
    }

    #[test]
    fn direktiven_sind_fuer_envfilter_gueltig() {
        let e = LogEinstellungen::aufloesen("info", "text", None, None);
        assert!(EnvFilter::try_new(&e.filter).is_ok());
    }

    #[test]
    fn log_level_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level} muss gueltig sein");
        }
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO"));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
    }
}
