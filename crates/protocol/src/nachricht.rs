//! Signaling-Nachrichten (WebSocket, JSON)
//!
//! Definiert alle Nachrichten die zwischen Client und Relay ausgetauscht
//! werden.
//!
//! ## Design
//! - Jede Nachricht ist ein Umschlag `{"type": "...", "payload": {...}}`
//! - Payload-Schluessel in camelCase
//! - SDP- und ICE-Inhalte sind opake JSON-Werte und werden nie interpretiert

use chrono::{DateTime, Utc};
use praxisruf_core::types::{ConnectionId, Rolle, SessionId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DuplicateId,
    TargetUnavailable,
    ProtocolViolation,
    UnsupportedMessage,
    NoActiveSession,
    NotRegistered,
    RoomFull,
    InvalidPayload,
}

impl ErrorCode {
    /// Gibt den Wire-Namen des Codes zurueck (auch als Metrik-Label genutzt)
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::DuplicateId => "DUPLICATE_ID",
            Self::TargetUnavailable => "TARGET_UNAVAILABLE",
            Self::ProtocolViolation => "PROTOCOL_VIOLATION",
            Self::UnsupportedMessage => "UNSUPPORTED_MESSAGE",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::RoomFull => "ROOM_FULL",
            Self::InvalidPayload => "INVALID_PAYLOAD",
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Anmeldung eines Teilnehmers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Anzeigename
    pub display_name: String,
    /// Rolle (doctor/patient)
    pub role: Rolle,
    /// Optionaler Raum – bindet den Teilnehmer an einen festen Raum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Anrufanfrage an einen anderen Teilnehmer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub target_id: ConnectionId,
}

/// Verweis auf eine Anruf-Sitzung (accept, decline, hangup, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: SessionId,
}

/// SDP-Angebot oder -Antwort (Inhalt opak)
///
/// Felder neben `sessionId` und `sdp` landen in `weitere` und werden beim
/// Weiterleiten wieder ausgegeben, der Payload kommt also vollstaendig an.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignal {
    pub session_id: SessionId,
    pub sdp: serde_json::Value,
    #[serde(flatten)]
    pub weitere: serde_json::Map<String, serde_json::Value>,
}

/// ICE-Kandidat (Inhalt opak, zusaetzliche Felder wie bei `SdpSignal`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceSignal {
    pub session_id: SessionId,
    pub candidate: serde_json::Value,
    #[serde(flatten)]
    pub weitere: serde_json::Map<String, serde_json::Value>,
}

/// Alle Nachrichten die ein Client an das Relay senden kann
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientNachricht {
    #[serde(rename = "register")]
    Register(RegisterRequest),
    #[serde(rename = "logout")]
    Logout,
    #[serde(rename = "presence.request")]
    PresenceRequest,
    #[serde(rename = "call.request")]
    CallRequest(CallRequest),
    #[serde(rename = "call.accept")]
    CallAccept(SessionRef),
    #[serde(rename = "call.decline")]
    CallDecline(SessionRef),
    #[serde(rename = "offer")]
    Offer(SdpSignal),
    #[serde(rename = "answer")]
    Answer(SdpSignal),
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceSignal),
    #[serde(rename = "hangup")]
    Hangup(SessionRef),
}

impl ClientNachricht {
    /// Alle Nachrichtentypen die ein Client senden darf
    pub const TYPEN: &'static [&'static str] = &[
        "register",
        "logout",
        "presence.request",
        "call.request",
        "call.accept",
        "call.decline",
        "offer",
        "answer",
        "ice-candidate",
        "hangup",
    ];

    /// Gibt den Wire-Typ der Nachricht zurueck
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Logout => "logout",
            Self::PresenceRequest => "presence.request",
            Self::CallRequest(_) => "call.request",
            Self::CallAccept(_) => "call.accept",
            Self::CallDecline(_) => "call.decline",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Hangup(_) => "hangup",
        }
    }

    /// Gibt die referenzierte Sitzung zurueck (nur sitzungsbezogene Typen)
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::CallAccept(r) | Self::CallDecline(r) | Self::Hangup(r) => Some(r.session_id),
            Self::Offer(s) | Self::Answer(s) => Some(s.session_id),
            Self::IceCandidate(i) => Some(i.session_id),
            Self::Register(_) | Self::Logout | Self::PresenceRequest | Self::CallRequest(_) => None,
        }
    }

    /// Serialisiert die Nachricht als JSON-Umschlag
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

/// Bestaetigung einer Anmeldung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub id: ConnectionId,
    pub display_name: String,
    pub role: Rolle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Ein Eintrag der Presence-Liste
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEintrag {
    pub id: ConnectionId,
    pub display_name: String,
    pub role: Rolle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Vollstaendiger Presence-Schnappschuss (kein Delta)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub doctors: Vec<PresenceEintrag>,
    pub patients: Vec<PresenceEintrag>,
}

/// Eingehender Anruf (an den Angerufenen)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncoming {
    pub session_id: SessionId,
    pub from_id: ConnectionId,
    pub from_name: String,
    pub from_role: Rolle,
}

/// Bestaetigung an den Anrufer: Anfrage angenommen, Ziel klingelt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRinging {
    pub session_id: SessionId,
    pub target_id: ConnectionId,
}

/// Grund fuer das Ende einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Beendigungsgrund {
    /// Ein Teilnehmer hat aufgelegt
    Hangup,
    /// Ein Teilnehmer hat die Verbindung getrennt oder sich abgemeldet
    Disconnect,
    /// Klingel-Timeout abgelaufen
    Timeout,
    /// Angerufener hat abgelehnt
    Declined,
}

impl Beendigungsgrund {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Hangup => "hangup",
            Self::Disconnect => "disconnect",
            Self::Timeout => "timeout",
            Self::Declined => "declined",
        }
    }
}

/// Auflegen-Benachrichtigung (an beide Teilnehmer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangupNotice {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Beendigungsgrund>,
}

/// Zweiter Teilnehmer ist dem Raum beigetreten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomReady {
    pub room: String,
    pub peer_id: ConnectionId,
    pub peer_name: String,
    pub peer_role: Rolle,
}

/// Typisierte Ablehnung (nur an den Absender)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Alle Nachrichten die das Relay an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerNachricht {
    #[serde(rename = "registered")]
    Registered(Registered),
    #[serde(rename = "presence")]
    Presence(PresenceSnapshot),
    #[serde(rename = "call.incoming")]
    CallIncoming(CallIncoming),
    #[serde(rename = "call.ringing")]
    CallRinging(CallRinging),
    #[serde(rename = "call.accepted")]
    CallAccepted(SessionRef),
    #[serde(rename = "call.declined")]
    CallDeclined(SessionRef),
    #[serde(rename = "offer")]
    Offer(SdpSignal),
    #[serde(rename = "answer")]
    Answer(SdpSignal),
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceSignal),
    #[serde(rename = "hangup")]
    Hangup(HangupNotice),
    #[serde(rename = "room.ready")]
    RoomReady(RoomReady),
    #[serde(rename = "error")]
    Error(ErrorResponse),
}

impl ServerNachricht {
    /// Erstellt eine Fehler-Nachricht
    pub fn error(
        code: ErrorCode,
        message: impl Into<String>,
        request_type: Option<&str>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
            request_type: request_type.map(str::to_string),
            session_id,
        })
    }

    /// Erstellt eine Auflegen-Benachrichtigung mit Grund
    pub fn hangup(session_id: SessionId, grund: Beendigungsgrund) -> Self {
        Self::Hangup(HangupNotice {
            session_id,
            reason: Some(grund),
        })
    }

    /// Gibt den Wire-Typ der Nachricht zurueck
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::Presence(_) => "presence",
            Self::CallIncoming(_) => "call.incoming",
            Self::CallRinging(_) => "call.ringing",
            Self::CallAccepted(_) => "call.accepted",
            Self::CallDeclined(_) => "call.declined",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::Hangup(_) => "hangup",
            Self::RoomReady(_) => "room.ready",
            Self::Error(_) => "error",
        }
    }

    /// Serialisiert die Nachricht als JSON-Umschlag
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus einem JSON-Umschlag
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_incoming_wire_format() {
        let sid = SessionId::new();
        let von = ConnectionId::new();
        let msg = ServerNachricht::CallIncoming(CallIncoming {
            session_id: sid,
            from_id: von,
            from_name: "Alice".to_string(),
            from_role: Rolle::Arzt,
        });
        let wert: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(wert["type"], "call.incoming");
        assert_eq!(wert["payload"]["fromName"], "Alice");
        assert_eq!(wert["payload"]["fromRole"], "doctor");
        assert_eq!(wert["payload"]["sessionId"], json!(sid.inner().to_string()));
    }

    #[test]
    fn error_response_laesst_leere_felder_weg() {
        let msg = ServerNachricht::error(ErrorCode::NoActiveSession, "Keine Sitzung", None, None);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"code\":\"NO_ACTIVE_SESSION\""));
        assert!(!json.contains("requestType"));
        assert!(!json.contains("sessionId"));
    }

    #[test]
    fn hangup_mit_grund() {
        let sid = SessionId::new();
        let msg = ServerNachricht::hangup(sid, Beendigungsgrund::Disconnect);
        let decoded = ServerNachricht::from_json(&msg.to_json().unwrap()).unwrap();
        if let ServerNachricht::Hangup(h) = decoded {
            assert_eq!(h.session_id, sid);
            assert_eq!(h.reason, Some(Beendigungsgrund::Disconnect));
        } else {
            panic!("Erwartet Hangup-Payload");
        }
    }

    #[test]
    fn offer_sdp_bleibt_unveraendert() {
        let sdp = json!({"type": "offer", "sdp": "v=0\r\no=- 46117317 2 IN IP4 127.0.0.1\r\n"});
        let msg = ServerNachricht::Offer(SdpSignal {
            session_id: SessionId::new(),
            sdp: sdp.clone(),
            weitere: Default::default(),
        });
        let decoded = ServerNachricht::from_json(&msg.to_json().unwrap()).unwrap();
        match decoded {
            ServerNachricht::Offer(s) => assert_eq!(s.sdp, sdp),
            andere => panic!("Erwartet Offer, erhalten {andere:?}"),
        }
    }

    #[test]
    fn zusaetzliche_signal_felder_bleiben_erhalten() {
        let sid = SessionId::new();
        let payload = json!({
            "sessionId": sid,
            "sdp": "v=0\r\n",
            "sdpType": "offer",
            "trickle": true,
        });
        let signal: SdpSignal = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(signal.session_id, sid);
        assert_eq!(signal.weitere.get("trickle"), Some(&json!(true)));

        let text = ServerNachricht::Offer(signal).to_json().unwrap();
        let wert: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(wert["payload"], payload);
    }

    #[test]
    fn ice_kandidat_mit_sdp_mid() {
        let payload = json!({
            "sessionId": SessionId::new(),
            "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
        });
        let signal: IceSignal = serde_json::from_value(payload.clone()).unwrap();
        assert_eq!(serde_json::to_value(&signal).unwrap(), payload);
    }

    #[test]
    fn client_typen_vollstaendig() {
        let beispiele = [
            ClientNachricht::Logout,
            ClientNachricht::PresenceRequest,
            ClientNachricht::Hangup(SessionRef {
                session_id: SessionId::new(),
            }),
        ];
        for n in &beispiele {
            assert!(ClientNachricht::TYPEN.contains(&n.typ()));
        }
    }

    #[test]
    fn error_codes_wire_namen_stimmen_mit_serde_ueberein() {
        let codes = [
            ErrorCode::DuplicateId,
            ErrorCode::TargetUnavailable,
            ErrorCode::ProtocolViolation,
            ErrorCode::UnsupportedMessage,
            ErrorCode::NoActiveSession,
            ErrorCode::NotRegistered,
            ErrorCode::RoomFull,
            ErrorCode::InvalidPayload,
        ];
        for code in &codes {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.als_str()));
        }
    }
}
