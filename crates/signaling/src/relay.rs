//! Relay – Thread-sichere Fassade ueber Kern, Broadcaster und Metriken
//!
//! Jedes Transport-Ereignis (Verbinden, Nachricht, Trennen) ist eine
//! Arbeitseinheit. Der Kern wird pro Einheit genau einmal gesperrt; die
//! Zustellung reiht nur in die Send-Queues ein (`try_send`), das Schreiben
//! auf die Sockets passiert ausserhalb in den Verbindungs-Tasks. Weil das
//! Einreihen noch unter dem Lock geschieht, sehen alle Clients die
//! Nachrichten in der Reihenfolge der Zustandsuebergaenge.

use parking_lot::Mutex;
use praxisruf_core::types::{ConnectionId, SessionId};
use praxisruf_observability::{PraxisrufMetrics, PresenceZaehler};
use praxisruf_protocol::nachricht::PresenceSnapshot;
use praxisruf_protocol::{ClientNachricht, MessageCodec, ServerNachricht};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::broadcast::EventBroadcaster;
use crate::dispatcher::RelayKern;
use crate::error::SignalingError;
use crate::server_state::SignalingConfig;

/// Signaling-Relay
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    kern: Mutex<RelayKern>,
    broadcaster: EventBroadcaster,
    codec: MessageCodec,
    metriken: PraxisrufMetrics,
    klingel_timeout: Option<Duration>,
}

impl Relay {
    pub fn neu(config: &SignalingConfig, metriken: PraxisrufMetrics) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                kern: Mutex::new(RelayKern::neu()),
                broadcaster: EventBroadcaster::mit_queue_groesse(config.send_queue_groesse),
                codec: MessageCodec::with_max_size(config.max_nachricht_groesse),
                metriken,
                klingel_timeout: config.klingel_timeout(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Transport-Ereignisse
    // -----------------------------------------------------------------------

    /// Neue Verbindung: vergibt die ID und gibt die Send-Queue zurueck
    ///
    /// Die Verbindung ist danach offen, aber noch nicht angemeldet.
    pub fn verbinden(&self) -> (ConnectionId, mpsc::Receiver<ServerNachricht>) {
        let id = ConnectionId::new();
        let rx = self.inner.broadcaster.client_registrieren(id);
        self.inner
            .metriken
            .connected_clients
            .set(self.inner.broadcaster.client_anzahl() as i64);
        tracing::debug!(conn_id = %id, "Verbindung geoeffnet");
        (id, rx)
    }

    /// Rohe Textnachricht eines Clients dekodieren und verarbeiten
    pub fn text_empfangen(&self, absender: ConnectionId, text: &str) {
        match self.inner.codec.dekodieren(text) {
            Ok(nachricht) => self.nachricht_verarbeiten(absender, nachricht),
            Err(fehler) => {
                let typ = fehler.typ().map(str::to_string);
                let fehler = SignalingError::from(fehler);
                self.ablehnen(absender, &fehler, typ.as_deref(), None);
            }
        }
    }

    /// Binaer-Frame: nur gueltiges UTF-8 wird als JSON-Text weitergereicht
    pub fn binaer_empfangen(&self, absender: ConnectionId, daten: &[u8]) {
        match std::str::from_utf8(daten) {
            Ok(text) => self.text_empfangen(absender, text),
            Err(_) => self.ablehnen(
                absender,
                &SignalingError::UngueltigeNachricht("Binaer-Frame ist kein UTF-8".into()),
                None,
                None,
            ),
        }
    }

    /// Dekodierte Nachricht eines Clients verarbeiten
    pub fn nachricht_verarbeiten(&self, absender: ConnectionId, nachricht: ClientNachricht) {
        let typ = nachricht.typ();
        let session_id = nachricht.session_id();
        let weitergeleitet = matches!(
            nachricht,
            ClientNachricht::Offer(_)
                | ClientNachricht::Answer(_)
                | ClientNachricht::IceCandidate(_)
                | ClientNachricht::Hangup(_)
        );

        let mut kern = self.inner.kern.lock();
        match kern.dispatch(absender, nachricht, Instant::now()) {
            Ok(ausgaenge) => {
                tracing::trace!(conn_id = %absender, typ, anzahl = ausgaenge.len(), "Nachricht verarbeitet");
                self.inner.broadcaster.zustellen(ausgaenge);
                if weitergeleitet {
                    self.inner
                        .metriken
                        .signals_relayed_total
                        .with_label_values(&[typ])
                        .inc();
                }
            }
            Err(fehler) => self.ablehnen(absender, &fehler, Some(typ), session_id),
        }
        self.metriken_aktualisieren(&mut kern);
    }

    /// Verbindung geschlossen: raeumt bedingungslos auf
    pub fn trennen(&self, id: ConnectionId) {
        let mut kern = self.inner.kern.lock();
        self.inner.broadcaster.client_entfernen(&id);
        let ausgaenge = kern.teilnehmer_entfernen(id);
        self.inner.broadcaster.zustellen(ausgaenge);
        self.metriken_aktualisieren(&mut kern);
        self.inner
            .metriken
            .connected_clients
            .set(self.inner.broadcaster.client_anzahl() as i64);
        tracing::debug!(conn_id = %id, "Verbindung geschlossen");
    }

    /// Beendet klingelnde Sitzungen, deren Timeout abgelaufen ist
    ///
    /// Gibt die Anzahl beendeter Sitzungen zurueck; ohne konfigurierten
    /// Timeout immer 0.
    pub fn abgelaufene_anrufe_beenden(&self, jetzt: Instant) -> usize {
        let Some(timeout) = self.inner.klingel_timeout else {
            return 0;
        };
        let mut kern = self.inner.kern.lock();
        let ausgaenge = kern.abgelaufene_beenden(jetzt, timeout);
        // Zwei Benachrichtigungen pro Sitzung
        let anzahl = ausgaenge.len() / 2;
        if anzahl > 0 {
            tracing::info!(anzahl, "Klingel-Timeout: Sitzungen beendet");
        }
        self.inner.broadcaster.zustellen(ausgaenge);
        self.metriken_aktualisieren(&mut kern);
        anzahl
    }

    /// Periodische Pruefung auf abgelaufene Klingel-Timeouts
    ///
    /// Kehrt sofort zurueck wenn kein Timeout konfiguriert ist, sonst laeuft
    /// sie bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn klingel_timeouts_ueberwachen(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let Some(timeout) = self.inner.klingel_timeout else {
            return;
        };
        let intervall = (timeout / 4).clamp(Duration::from_millis(100), Duration::from_secs(1));
        let mut takt = tokio::time::interval(intervall);
        tracing::info!(timeout_sek = timeout.as_secs(), "Klingel-Timeout aktiv");

        loop {
            tokio::select! {
                _ = takt.tick() => {
                    self.abgelaufene_anrufe_beenden(Instant::now());
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Klingel-Ueberwachung beendet");
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn presence(&self) -> PresenceSnapshot {
        self.inner.kern.lock().registry.schnappschuss()
    }

    /// Offene Verbindungen (angemeldet oder nicht)
    pub fn verbindungen(&self) -> usize {
        self.inner.broadcaster.client_anzahl()
    }

    pub fn aktive_sitzungen(&self) -> usize {
        self.inner.kern.lock().sitzungen.anzahl()
    }

    pub fn klingel_timeout(&self) -> Option<Duration> {
        self.inner.klingel_timeout
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn ablehnen(
        &self,
        absender: ConnectionId,
        fehler: &SignalingError,
        request_type: Option<&str>,
        session_id: Option<SessionId>,
    ) {
        let code = fehler.code();
        match fehler {
            SignalingError::Protokollverletzung(_) => tracing::warn!(
                conn_id = %absender,
                typ = request_type.unwrap_or("-"),
                fehler = %fehler,
                "Nachricht abgelehnt"
            ),
            _ => tracing::debug!(
                conn_id = %absender,
                typ = request_type.unwrap_or("-"),
                fehler = %fehler,
                "Nachricht abgelehnt"
            ),
        }
        self.inner
            .metriken
            .rejections_total
            .with_label_values(&[code.als_str()])
            .inc();
        self.inner.broadcaster.an_client_senden(
            &absender,
            ServerNachricht::error(code, fehler.to_string(), request_type, session_id),
        );
    }

    fn metriken_aktualisieren(&self, kern: &mut RelayKern) {
        let metriken = &self.inner.metriken;
        metriken
            .registered_participants
            .set(kern.registry.anzahl() as i64);
        metriken
            .call_sessions_active
            .set(kern.sitzungen.anzahl() as i64);
        for grund in kern.sitzungen.beendete_abholen() {
            metriken
                .calls_total
                .with_label_values(&[grund.als_str()])
                .inc();
        }
    }
}

impl PresenceZaehler for Relay {
    fn teilnehmer_zaehlen(&self) -> (usize, usize) {
        self.inner.kern.lock().registry.zaehlen()
    }
}
