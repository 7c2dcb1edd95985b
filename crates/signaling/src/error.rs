//! Fehlertypen fuer das Signaling-Relay
//!
//! Jeder Fehler wird am Router in eine typisierte `error`-Nachricht an den
//! Absender uebersetzt. Kein Fehler beendet die Verbindung oder den Prozess.

use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::{CodecFehler, ErrorCode};
use thiserror::Error;

/// Fehlertyp fuer das Signaling-Relay
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// Verbindungs-ID ist bereits angemeldet
    #[error("Verbindung bereits angemeldet: {0}")]
    DoppelteId(ConnectionId),

    /// Ziel existiert nicht, ist belegt oder nicht erreichbar
    #[error("Ziel nicht verfuegbar: {0}")]
    ZielNichtVerfuegbar(String),

    /// Nachricht passt nicht zum Zustand der Sitzung
    #[error("Protokollverletzung: {0}")]
    Protokollverletzung(String),

    /// Unbekannter Nachrichtentyp
    #[error("Nicht unterstuetzter Nachrichtentyp: {0}")]
    NichtUnterstuetzt(String),

    /// Absender hat keine (passende) laufende Sitzung
    #[error("Keine aktive Sitzung")]
    KeineAktiveSitzung,

    /// Nachricht erfordert eine Anmeldung
    #[error("Nicht angemeldet")]
    NichtRegistriert,

    /// Raum hat bereits zwei Teilnehmer
    #[error("Raum ist voll: {0}")]
    RaumVoll(String),

    /// Umschlag oder Payload nicht lesbar
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),
}

impl SignalingError {
    /// Wire-Code fuer die `error`-Nachricht
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DoppelteId(_) => ErrorCode::DuplicateId,
            Self::ZielNichtVerfuegbar(_) => ErrorCode::TargetUnavailable,
            Self::Protokollverletzung(_) => ErrorCode::ProtocolViolation,
            Self::NichtUnterstuetzt(_) => ErrorCode::UnsupportedMessage,
            Self::KeineAktiveSitzung => ErrorCode::NoActiveSession,
            Self::NichtRegistriert => ErrorCode::NotRegistered,
            Self::RaumVoll(_) => ErrorCode::RoomFull,
            Self::UngueltigeNachricht(_) => ErrorCode::InvalidPayload,
        }
    }

    pub fn ziel(grund: impl Into<String>) -> Self {
        Self::ZielNichtVerfuegbar(grund.into())
    }

    pub fn protokoll(grund: impl Into<String>) -> Self {
        Self::Protokollverletzung(grund.into())
    }
}

impl From<CodecFehler> for SignalingError {
    fn from(fehler: CodecFehler) -> Self {
        match fehler {
            CodecFehler::UnbekannterTyp(typ) => Self::NichtUnterstuetzt(typ),
            andere => Self::UngueltigeNachricht(andere.to_string()),
        }
    }
}

/// Ergebnis-Typ fuer Signaling-Operationen
pub type SignalingResult<T> = Result<T, SignalingError>;
