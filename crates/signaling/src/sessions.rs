//! Call-Session-Manager – Lebenszyklus der Anruf-Sitzungen
//!
//! ## Zustandsmaschine
//! ```text
//! Klingelt --accept--> Angenommen --offer--> Verhandlung --answer--> Aktiv
//!    |                     |                     |                     |
//!    +-- decline/hangup/disconnect/timeout ------+---------------------+--> Beendet
//! ```
//!
//! Beendete Sitzungen werden sofort entfernt. Pro Teilnehmer existiert
//! hoechstens eine laufende Sitzung; der Index `nach_teilnehmer` haelt
//! diese Invariante.

use praxisruf_core::types::{ConnectionId, SessionId};
use praxisruf_protocol::nachricht::Beendigungsgrund;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{SignalingError, SignalingResult};
use crate::registry::ConnectionRegistry;

// ---------------------------------------------------------------------------
// CallSession
// ---------------------------------------------------------------------------

/// Zustand einer Anruf-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufZustand {
    /// Anfrage gestellt, Angerufener wurde benachrichtigt
    Klingelt,
    /// Angerufener hat angenommen, noch kein SDP-Angebot
    Angenommen,
    /// Angebot weitergeleitet, Antwort ausstehend
    Verhandlung,
    /// Angebot und Antwort ausgetauscht
    Aktiv,
    /// Terminal; nur in Rueckgabewerten sichtbar
    Beendet,
}

impl AnrufZustand {
    /// ICE-Kandidaten sind erst nach der Annahme erlaubt
    pub fn erlaubt_ice(&self) -> bool {
        matches!(self, Self::Angenommen | Self::Verhandlung | Self::Aktiv)
    }
}

/// Eine Anruf-Sitzung zwischen genau zwei Teilnehmern
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: SessionId,
    /// Anrufer
    pub initiator: ConnectionId,
    /// Angerufener
    pub responder: ConnectionId,
    pub zustand: AnrufZustand,
    pub angebot_gesendet: bool,
    pub antwort_gesendet: bool,
    pub erstellt: Instant,
}

impl CallSession {
    /// Gegenueber von `id`, falls `id` an der Sitzung beteiligt ist
    pub fn gegenueber(&self, id: &ConnectionId) -> Option<ConnectionId> {
        if *id == self.initiator {
            Some(self.responder)
        } else if *id == self.responder {
            Some(self.initiator)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// CallSessionManager
// ---------------------------------------------------------------------------

/// Verwaltet alle laufenden Anruf-Sitzungen
#[derive(Debug, Default)]
pub struct CallSessionManager {
    sitzungen: HashMap<SessionId, CallSession>,
    /// Teilnehmer -> laufende Sitzung
    nach_teilnehmer: HashMap<ConnectionId, SessionId>,
    /// Beendete Sitzungen seit dem letzten Abholen (fuer Metriken)
    beendet: Vec<Beendigungsgrund>,
}

impl CallSessionManager {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn anzahl(&self) -> usize {
        self.sitzungen.len()
    }

    pub fn sitzung(&self, id: &SessionId) -> Option<&CallSession> {
        self.sitzungen.get(id)
    }

    /// Laufende Sitzung eines Teilnehmers
    pub fn sitzung_von(&self, teilnehmer: &ConnectionId) -> Option<&CallSession> {
        self.nach_teilnehmer
            .get(teilnehmer)
            .and_then(|sid| self.sitzungen.get(sid))
    }

    /// Startet einen Anruf (`call.request`)
    pub fn anrufen(
        &mut self,
        registry: &ConnectionRegistry,
        initiator: ConnectionId,
        ziel: ConnectionId,
        jetzt: Instant,
    ) -> SignalingResult<&CallSession> {
        let anrufer = registry
            .teilnehmer(&initiator)
            .ok_or(SignalingError::NichtRegistriert)?;
        if ziel == initiator {
            return Err(SignalingError::ziel("Selbstanruf nicht moeglich"));
        }
        let angerufener = registry
            .teilnehmer(&ziel)
            .ok_or_else(|| SignalingError::ziel(format!("{ziel} ist nicht angemeldet")))?;
        if !anrufer.bindung.vertraeglich(&angerufener.bindung) {
            return Err(SignalingError::ziel(format!("{ziel} ist nicht im selben Raum")));
        }
        if self.nach_teilnehmer.contains_key(&initiator) {
            return Err(SignalingError::protokoll("Bereits in einem Anruf"));
        }
        if self.nach_teilnehmer.contains_key(&ziel) {
            return Err(SignalingError::ziel(format!("{ziel} ist besetzt")));
        }

        let session_id = SessionId::new();
        tracing::info!(
            session_id = %session_id,
            initiator = %initiator,
            responder = %ziel,
            "Anruf gestartet"
        );

        self.nach_teilnehmer.insert(initiator, session_id);
        self.nach_teilnehmer.insert(ziel, session_id);
        let sitzung = self.sitzungen.entry(session_id).or_insert(CallSession {
            id: session_id,
            initiator,
            responder: ziel,
            zustand: AnrufZustand::Klingelt,
            angebot_gesendet: false,
            antwort_gesendet: false,
            erstellt: jetzt,
        });
        Ok(&*sitzung)
    }

    /// Prueft ob `absender` gerade die Sitzung `session_id` fuehrt
    fn autorisieren(
        &mut self,
        absender: &ConnectionId,
        session_id: &SessionId,
    ) -> SignalingResult<&mut CallSession> {
        match self.nach_teilnehmer.get(absender) {
            Some(sid) if sid == session_id => self
                .sitzungen
                .get_mut(session_id)
                .ok_or(SignalingError::KeineAktiveSitzung),
            _ => Err(SignalingError::KeineAktiveSitzung),
        }
    }

    /// `call.accept`: nur der Angerufene, nur im Zustand Klingelt
    pub fn annehmen(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<&CallSession> {
        let sitzung = self.autorisieren(&absender, &session_id)?;
        if sitzung.responder != absender {
            return Err(SignalingError::protokoll("Nur der Angerufene kann annehmen"));
        }
        if sitzung.zustand != AnrufZustand::Klingelt {
            return Err(SignalingError::protokoll("Anruf wurde bereits angenommen"));
        }
        sitzung.zustand = AnrufZustand::Angenommen;
        tracing::info!(session_id = %session_id, "Anruf angenommen");
        Ok(&*sitzung)
    }

    /// `call.decline`: beendet die Sitzung
    pub fn ablehnen(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<CallSession> {
        let sitzung = self.autorisieren(&absender, &session_id)?;
        if sitzung.responder != absender {
            return Err(SignalingError::protokoll("Nur der Angerufene kann ablehnen"));
        }
        if sitzung.zustand != AnrufZustand::Klingelt {
            return Err(SignalingError::protokoll("Anruf wurde bereits angenommen"));
        }
        self.beenden(&session_id, Beendigungsgrund::Declined)
            .ok_or(SignalingError::KeineAktiveSitzung)
    }

    /// `offer`: nur der Anrufer, genau einmal, nach der Annahme
    ///
    /// Gibt den Empfaenger zurueck.
    pub fn angebot(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<ConnectionId> {
        let sitzung = self.autorisieren(&absender, &session_id)?;
        if sitzung.initiator != absender {
            return Err(SignalingError::protokoll("Nur der Anrufer sendet das Angebot"));
        }
        if sitzung.angebot_gesendet || sitzung.zustand != AnrufZustand::Angenommen {
            return Err(SignalingError::protokoll(format!(
                "Angebot im Zustand {:?} nicht erlaubt",
                sitzung.zustand
            )));
        }
        sitzung.angebot_gesendet = true;
        sitzung.zustand = AnrufZustand::Verhandlung;
        Ok(sitzung.responder)
    }

    /// `answer`: nur der Angerufene, genau einmal, nach dem Angebot
    pub fn antwort(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<ConnectionId> {
        let sitzung = self.autorisieren(&absender, &session_id)?;
        if sitzung.responder != absender {
            return Err(SignalingError::protokoll("Nur der Angerufene sendet die Antwort"));
        }
        if sitzung.antwort_gesendet || sitzung.zustand != AnrufZustand::Verhandlung {
            return Err(SignalingError::protokoll(format!(
                "Antwort im Zustand {:?} nicht erlaubt",
                sitzung.zustand
            )));
        }
        sitzung.antwort_gesendet = true;
        sitzung.zustand = AnrufZustand::Aktiv;
        tracing::info!(session_id = %session_id, "Anruf aktiv");
        Ok(sitzung.initiator)
    }

    /// `ice-candidate`: beliebig oft in beide Richtungen, ab der Annahme
    pub fn kandidat(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<ConnectionId> {
        let sitzung = self.autorisieren(&absender, &session_id)?;
        if !sitzung.zustand.erlaubt_ice() {
            return Err(SignalingError::protokoll(
                "ICE-Kandidaten erst nach Annahme erlaubt",
            ));
        }
        sitzung
            .gegenueber(&absender)
            .ok_or(SignalingError::KeineAktiveSitzung)
    }

    /// `hangup`: beendet die Sitzung aus jedem Zustand
    pub fn auflegen(
        &mut self,
        absender: ConnectionId,
        session_id: SessionId,
    ) -> SignalingResult<CallSession> {
        self.autorisieren(&absender, &session_id)?;
        self.beenden(&session_id, Beendigungsgrund::Hangup)
            .ok_or(SignalingError::KeineAktiveSitzung)
    }

    /// Beendet die Sitzung eines getrennten Teilnehmers (kann nicht fehlschlagen)
    pub fn teilnehmer_getrennt(&mut self, teilnehmer: &ConnectionId) -> Option<CallSession> {
        let session_id = *self.nach_teilnehmer.get(teilnehmer)?;
        self.beenden(&session_id, Beendigungsgrund::Disconnect)
    }

    /// Beendet alle Sitzungen, die laenger als `timeout` klingeln
    pub fn abgelaufene_beenden(&mut self, jetzt: Instant, timeout: Duration) -> Vec<CallSession> {
        let abgelaufen: Vec<SessionId> = self
            .sitzungen
            .values()
            .filter(|s| {
                s.zustand == AnrufZustand::Klingelt
                    && jetzt.saturating_duration_since(s.erstellt) >= timeout
            })
            .map(|s| s.id)
            .collect();

        abgelaufen
            .iter()
            .filter_map(|sid| self.beenden(sid, Beendigungsgrund::Timeout))
            .collect()
    }

    /// Gibt die seit dem letzten Aufruf beendeten Sitzungen (nach Grund) zurueck
    pub fn beendete_abholen(&mut self) -> Vec<Beendigungsgrund> {
        std::mem::take(&mut self.beendet)
    }

    fn beenden(&mut self, session_id: &SessionId, grund: Beendigungsgrund) -> Option<CallSession> {
        let mut sitzung = self.sitzungen.remove(session_id)?;
        self.nach_teilnehmer.remove(&sitzung.initiator);
        self.nach_teilnehmer.remove(&sitzung.responder);
        sitzung.zustand = AnrufZustand::Beendet;
        self.beendet.push(grund);
        tracing::info!(session_id = %session_id, grund = grund.als_str(), "Anruf beendet");
        Some(sitzung)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
