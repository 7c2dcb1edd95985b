//! Gemeinsame Identifikationstypen fuer Praxisruf
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Verbindungs- und Sitzungs-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Verbindungs-ID
///
/// Wird vom Transport beim Verbindungsaufbau vergeben und bleibt fuer die
/// Lebensdauer genau einer Verbindung stabil. Ein Reconnect erhaelt immer
/// eine neue ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Eindeutige Anruf-Sitzungs-ID
///
/// Jede Anrufanfrage erzeugt eine neue SessionId, auch zwischen denselben
/// zwei Teilnehmern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Rolle eines Teilnehmers
///
/// Beeinflusst nur die Darstellung in der Presence-Liste, nicht das Routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rolle {
    #[serde(rename = "doctor")]
    Arzt,
    #[serde(rename = "patient")]
    Patient,
}

impl Rolle {
    /// Gibt den Wire-Namen der Rolle zurueck
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Arzt => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_eindeutig() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b, "Zwei neue ConnectionIds muessen verschieden sein");
    }

    #[test]
    fn session_id_display() {
        let id = SessionId(Uuid::nil());
        assert!(id.to_string().starts_with("session:"));
    }

    #[test]
    fn ids_werden_als_nackte_uuid_serialisiert() {
        let id = ConnectionId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let zurueck: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }

    #[test]
    fn rolle_wire_namen() {
        assert_eq!(serde_json::to_string(&Rolle::Arzt).unwrap(), "\"doctor\"");
        assert_eq!(serde_json::to_string(&Rolle::Patient).unwrap(), "\"patient\"");
        let r: Rolle = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(r, Rolle::Arzt);
        assert!(serde_json::from_str::<Rolle>("\"nurse\"").is_err());
    }
}
