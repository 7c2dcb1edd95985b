//! Connection-Registry – Wer ist angemeldet, mit welcher Rolle, in welchem Raum
//!
//! Reine Datenstruktur ohne I/O. Sie lebt im `RelayKern` hinter dem
//! gemeinsamen Mutex; Benachrichtigungen (Presence-Broadcast, Sitzungsende)
//! erzeugt der Kern aus den Rueckgabewerten.
//!
//! Die Anmelde-Reihenfolge bleibt erhalten, damit Presence-Listen stabil
//! sortiert sind.

use chrono::{DateTime, Utc};
use praxisruf_core::types::{ConnectionId, Rolle};
use praxisruf_protocol::nachricht::{PresenceEintrag, PresenceSnapshot, Registered};
use std::collections::HashMap;

use crate::error::{SignalingError, SignalingResult};

/// Maximale Teilnehmerzahl pro Raum
pub const RAUM_KAPAZITAET: usize = 2;

// ---------------------------------------------------------------------------
// Teilnehmer
// ---------------------------------------------------------------------------

/// Wie ein Teilnehmer erreichbar ist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bindung {
    /// Direktanruf per Verbindungs-ID
    Direkt,
    /// An einen festen Raum gebunden
    Raum(String),
}

impl Bindung {
    /// Normalisiert den optionalen Raumnamen aus `register`
    pub fn aus_raum(raum: Option<String>) -> Self {
        match raum.map(|r| r.trim().to_string()) {
            Some(r) if !r.is_empty() => Self::Raum(r),
            _ => Self::Direkt,
        }
    }

    pub fn raum(&self) -> Option<&str> {
        match self {
            Self::Direkt => None,
            Self::Raum(r) => Some(r),
        }
    }

    /// Zwei Teilnehmer duerfen sich anrufen, wenn beide ungebunden sind
    /// oder beide im selben Raum sitzen.
    pub fn vertraeglich(&self, andere: &Bindung) -> bool {
        match (self, andere) {
            (Self::Direkt, Self::Direkt) => true,
            (Self::Raum(a), Self::Raum(b)) => a == b,
            _ => false,
        }
    }
}

/// Ein angemeldeter Teilnehmer
#[derive(Debug, Clone)]
pub struct Teilnehmer {
    pub id: ConnectionId,
    pub anzeigename: String,
    pub rolle: Rolle,
    pub bindung: Bindung,
    pub verbunden_seit: DateTime<Utc>,
}

impl Teilnehmer {
    pub fn als_presence(&self) -> PresenceEintrag {
        PresenceEintrag {
            id: self.id,
            display_name: self.anzeigename.clone(),
            role: self.rolle,
            room: self.bindung.raum().map(str::to_string),
            connected_at: self.verbunden_seit,
        }
    }

    pub fn als_registered(&self) -> Registered {
        Registered {
            id: self.id,
            display_name: self.anzeigename.clone(),
            role: self.rolle,
            room: self.bindung.raum().map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Menge aller angemeldeten Teilnehmer
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    teilnehmer: HashMap<ConnectionId, Teilnehmer>,
    /// Anmelde-Reihenfolge
    reihenfolge: Vec<ConnectionId>,
}

impl ConnectionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Meldet einen Teilnehmer an
    ///
    /// Fehler: `DoppelteId` wenn die Verbindung bereits angemeldet ist,
    /// `RaumVoll` wenn der Raum schon zwei Teilnehmer hat.
    pub fn registrieren(
        &mut self,
        id: ConnectionId,
        anzeigename: String,
        rolle: Rolle,
        bindung: Bindung,
    ) -> SignalingResult<&Teilnehmer> {
        if self.teilnehmer.contains_key(&id) {
            return Err(SignalingError::DoppelteId(id));
        }
        let anzeigename = anzeigename.trim().to_string();
        if anzeigename.is_empty() {
            return Err(SignalingError::UngueltigeNachricht(
                "displayName darf nicht leer sein".into(),
            ));
        }
        if let Bindung::Raum(raum) = &bindung {
            if self.raum_mitglieder(raum).len() >= RAUM_KAPAZITAET {
                return Err(SignalingError::RaumVoll(raum.clone()));
            }
        }

        tracing::info!(
            conn_id = %id,
            name = %anzeigename,
            rolle = %rolle,
            raum = bindung.raum().unwrap_or("-"),
            "Teilnehmer angemeldet"
        );

        self.reihenfolge.push(id);
        let eintrag = self.teilnehmer.entry(id).or_insert(Teilnehmer {
            id,
            anzeigename,
            rolle,
            bindung,
            verbunden_seit: Utc::now(),
        });
        Ok(&*eintrag)
    }

    /// Meldet einen Teilnehmer ab; unbekannte IDs sind ein No-op
    pub fn abmelden(&mut self, id: &ConnectionId) -> Option<Teilnehmer> {
        let teilnehmer = self.teilnehmer.remove(id)?;
        self.reihenfolge.retain(|x| x != id);
        tracing::info!(conn_id = %id, name = %teilnehmer.anzeigename, "Teilnehmer abgemeldet");
        Some(teilnehmer)
    }

    pub fn existiert(&self, id: &ConnectionId) -> bool {
        self.teilnehmer.contains_key(id)
    }

    pub fn teilnehmer(&self, id: &ConnectionId) -> Option<&Teilnehmer> {
        self.teilnehmer.get(id)
    }

    pub fn anzahl(&self) -> usize {
        self.teilnehmer.len()
    }

    /// Alle Teilnehmer in Anmelde-Reihenfolge, optional nach Rolle gefiltert
    pub fn liste(&self, rolle: Option<Rolle>) -> Vec<&Teilnehmer> {
        self.reihenfolge
            .iter()
            .filter_map(|id| self.teilnehmer.get(id))
            .filter(|t| rolle.map_or(true, |r| t.rolle == r))
            .collect()
    }

    /// Teilnehmer eines Raums in Anmelde-Reihenfolge
    pub fn raum_mitglieder(&self, raum: &str) -> Vec<&Teilnehmer> {
        self.reihenfolge
            .iter()
            .filter_map(|id| self.teilnehmer.get(id))
            .filter(|t| t.bindung.raum() == Some(raum))
            .collect()
    }

    /// Vollstaendiger Presence-Schnappschuss, nach Rolle getrennt
    pub fn schnappschuss(&self) -> PresenceSnapshot {
        let mut snapshot = PresenceSnapshot::default();
        for t in self.liste(None) {
            match t.rolle {
                Rolle::Arzt => snapshot.doctors.push(t.als_presence()),
                Rolle::Patient => snapshot.patients.push(t.als_presence()),
            }
        }
        snapshot
    }

    /// (Aerzte, Patienten)
    pub fn zaehlen(&self) -> (usize, usize) {
        self.teilnehmer
            .values()
            .fold((0, 0), |(a, p), t| match t.rolle {
                Rolle::Arzt => (a + 1, p),
                Rolle::Patient => (a, p + 1),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
