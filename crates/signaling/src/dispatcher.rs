//! Message-Dispatcher – Routet Client-Nachrichten an die richtigen Handler
//!
//! `RelayKern` buendelt Registry und Sitzungs-Manager. Er wird vom `Relay`
//! hinter genau einem Mutex gehalten, damit Anmelden, Abmelden und jeder
//! Sitzungs-Uebergang atomar zueinander sind. Insbesondere kann eine
//! Anruf-Anfrage nie mit der Trennung ihres Ziels verzahnt werden.
//!
//! ## Zustandspruefung
//! - `register` und `presence.request` sind ohne Anmeldung erlaubt
//! - `call.request` und `logout` erfordern eine Anmeldung
//! - Sitzungsbezogene Nachrichten erfordern die passende laufende Sitzung

use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::nachricht::{Beendigungsgrund, ServerNachricht};
use praxisruf_protocol::ClientNachricht;
use std::time::{Duration, Instant};

use crate::broadcast::Ausgang;
use crate::error::SignalingResult;
use crate::handlers::{call_handler, presence_handler, signal_handler};
use crate::registry::ConnectionRegistry;
use crate::sessions::CallSessionManager;

/// Gemeinsamer, veraenderlicher Relay-Zustand
#[derive(Debug, Default)]
pub struct RelayKern {
    pub registry: ConnectionRegistry,
    pub sitzungen: CallSessionManager,
}

impl RelayKern {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Verarbeitet eine dekodierte Client-Nachricht
    ///
    /// Bei einem Fehler wurde nichts veraendert und nichts weitergeleitet.
    pub fn dispatch(
        &mut self,
        absender: ConnectionId,
        nachricht: ClientNachricht,
        jetzt: Instant,
    ) -> SignalingResult<Vec<Ausgang>> {
        match nachricht {
            // -------------------------------------------------------------------
            // Presence
            // -------------------------------------------------------------------
            ClientNachricht::Register(req) => presence_handler::handle_register(self, absender, req),
            ClientNachricht::Logout => presence_handler::handle_logout(self, absender),
            ClientNachricht::PresenceRequest => {
                Ok(presence_handler::handle_presence_request(self, absender))
            }

            // -------------------------------------------------------------------
            // Anruf-Lebenszyklus
            // -------------------------------------------------------------------
            ClientNachricht::CallRequest(req) => {
                call_handler::handle_call_request(self, absender, req, jetzt)
            }
            ClientNachricht::CallAccept(r) => call_handler::handle_call_accept(self, absender, r),
            ClientNachricht::CallDecline(r) => call_handler::handle_call_decline(self, absender, r),

            // -------------------------------------------------------------------
            // Peer-zu-Peer-Signale
            // -------------------------------------------------------------------
            ClientNachricht::Offer(s) => signal_handler::handle_offer(self, absender, s),
            ClientNachricht::Answer(s) => signal_handler::handle_answer(self, absender, s),
            ClientNachricht::IceCandidate(s) => {
                signal_handler::handle_ice_candidate(self, absender, s)
            }
            ClientNachricht::Hangup(r) => signal_handler::handle_hangup(self, absender, r),
        }
    }

    /// Entfernt alle Spuren eines Teilnehmers (Trennung oder Logout)
    ///
    /// Eine laufende Sitzung endet sofort; das Gegenueber erhaelt genau eine
    /// `hangup`-Benachrichtigung. Kann nicht fehlschlagen.
    pub fn teilnehmer_entfernen(&mut self, id: ConnectionId) -> Vec<Ausgang> {
        let mut ausgaenge = Vec::new();

        if let Some(sitzung) = self.sitzungen.teilnehmer_getrennt(&id) {
            if let Some(gegenueber) = sitzung.gegenueber(&id) {
                ausgaenge.push(Ausgang::An(
                    gegenueber,
                    ServerNachricht::hangup(sitzung.id, Beendigungsgrund::Disconnect),
                ));
            }
        }

        if self.registry.abmelden(&id).is_some() {
            ausgaenge.push(Ausgang::AnAlle(ServerNachricht::Presence(
                self.registry.schnappschuss(),
            )));
        }
        ausgaenge
    }

    /// Beendet klingelnde Sitzungen nach Ablauf von `timeout`
    pub fn abgelaufene_beenden(&mut self, jetzt: Instant, timeout: Duration) -> Vec<Ausgang> {
        self.sitzungen
            .abgelaufene_beenden(jetzt, timeout)
            .into_iter()
            .flat_map(|sitzung| {
                let hinweis = ServerNachricht::hangup(sitzung.id, Beendigungsgrund::Timeout);
                [
                    Ausgang::An(sitzung.initiator, hinweis.clone()),
                    Ausgang::An(sitzung.responder, hinweis),
                ]
            })
            .collect()
    }
}
