//! Wire-Format fuer WebSocket-Verbindungen
//!
//! Jeder Text-Frame enthaelt genau einen JSON-Umschlag:
//!
//! ```text
//! {"type": "<nachrichtentyp>", "payload": { ... }}
//! ```
//!
//! Der Umschlag wird in zwei Schritten dekodiert: zuerst `type` und ein
//! untypisierter `payload`, danach der Payload gegen den zum Typ gehoerenden
//! Struct. So laesst sich ein unbekannter Typ sauber von einem kaputten
//! Payload unterscheiden.

use serde::Deserialize;
use thiserror::Error;

use crate::nachricht::ClientNachricht;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Nachrichtengroesse (64 KB, SDP-Blobs bleiben deutlich darunter)
pub const DEFAULT_MAX_NACHRICHT_GROESSE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Dekodieren eines eingehenden Frames
#[derive(Debug, Error)]
pub enum CodecFehler {
    /// Frame ueberschreitet die maximale Groesse
    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    ZuGross { groesse: usize, maximum: usize },

    /// Frame ist kein gueltiger JSON-Umschlag
    #[error("Ungueltiger Umschlag: {0}")]
    Umschlag(#[source] serde_json::Error),

    /// Nachrichtentyp ist nicht bekannt
    #[error("Nicht unterstuetzter Nachrichtentyp: '{0}'")]
    UnbekannterTyp(String),

    /// Payload passt nicht zum Nachrichtentyp
    #[error("Ungueltiger Payload fuer '{typ}': {quelle}")]
    Payload {
        typ: String,
        #[source]
        quelle: serde_json::Error,
    },
}

impl CodecFehler {
    /// Gibt den Nachrichtentyp zurueck, soweit er bereits gelesen wurde
    pub fn typ(&self) -> Option<&str> {
        match self {
            Self::UnbekannterTyp(typ) | Self::Payload { typ, .. } => Some(typ),
            Self::ZuGross { .. } | Self::Umschlag(_) => None,
        }
    }
}

/// Untypisierter Umschlag (erster Dekodier-Schritt)
#[derive(Debug, Deserialize)]
struct Umschlag {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// MessageCodec
// ---------------------------------------------------------------------------

/// Codec fuer JSON-Umschlaege auf WebSocket-Text-Frames
#[derive(Debug, Clone)]
pub struct MessageCodec {
    /// Maximale erlaubte Nachrichtengroesse in Bytes
    max_groesse: usize,
}

impl MessageCodec {
    /// Erstellt einen neuen `MessageCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_groesse: DEFAULT_MAX_NACHRICHT_GROESSE,
        }
    }

    /// Erstellt einen `MessageCodec` mit benutzerdefinierter maximaler Groesse
    pub fn with_max_size(max_groesse: usize) -> Self {
        Self { max_groesse }
    }

    /// Dekodiert einen eingehenden Text-Frame in eine typisierte Client-Nachricht
    pub fn dekodieren(&self, text: &str) -> Result<ClientNachricht, CodecFehler> {
        if text.len() > self.max_groesse {
            return Err(CodecFehler::ZuGross {
                groesse: text.len(),
                maximum: self.max_groesse,
            });
        }

        let umschlag: Umschlag = serde_json::from_str(text).map_err(CodecFehler::Umschlag)?;
        let Umschlag { typ, payload } = umschlag;

        let nachricht = match typ.as_str() {
            "register" => payload_lesen(&typ, payload).map(ClientNachricht::Register),
            "logout" => Ok(ClientNachricht::Logout),
            "presence.request" => Ok(ClientNachricht::PresenceRequest),
            "call.request" => payload_lesen(&typ, payload).map(ClientNachricht::CallRequest),
            "call.accept" => payload_lesen(&typ, payload).map(ClientNachricht::CallAccept),
            "call.decline" => payload_lesen(&typ, payload).map(ClientNachricht::CallDecline),
            "offer" => payload_lesen(&typ, payload).map(ClientNachricht::Offer),
            "answer" => payload_lesen(&typ, payload).map(ClientNachricht::Answer),
            "ice-candidate" => payload_lesen(&typ, payload).map(ClientNachricht::IceCandidate),
            "hangup" => payload_lesen(&typ, payload).map(ClientNachricht::Hangup),
            _ => Err(CodecFehler::UnbekannterTyp(typ.clone())),
        }?;

        Ok(nachricht)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_lesen<T>(typ: &str, payload: serde_json::Value) -> Result<T, CodecFehler>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(payload).map_err(|quelle| CodecFehler::Payload {
        typ: typ.to_string(),
        quelle,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
