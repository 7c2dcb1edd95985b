//! Event-Broadcaster – Stellt Server-Nachrichten an verbundene Clients zu
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller offenen
//! WebSocket-Verbindungen. Zustellen heisst nur Einreihen (`try_send`);
//! das Schreiben auf den Socket erledigt der Verbindungs-Task.
//!
//! ## Langsame Clients
//! Laeuft die Queue eines Clients ueber, wird sein Sender entfernt. Der
//! Verbindungs-Task sieht daraufhin eine geschlossene Queue und trennt die
//! Verbindung. So geht keine Signaling-Nachricht stillschweigend verloren.

use dashmap::DashMap;
use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::ServerNachricht;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard-Groesse der Send-Queue pro Client
pub const DEFAULT_SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Ausgang
// ---------------------------------------------------------------------------

/// Zustell-Anweisung, erzeugt von den Handlern
#[derive(Debug, Clone, PartialEq)]
pub enum Ausgang {
    /// An genau eine Verbindung
    An(ConnectionId, ServerNachricht),
    /// An alle offenen Verbindungen
    AnAlle(ServerNachricht),
}

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Ergebnis eines Einreihe-Versuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendeErgebnis {
    Eingereiht,
    /// Queue voll, Client kommt nicht hinterher
    Voll,
    /// Verbindung bereits geschlossen
    Geschlossen,
}

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub conn_id: ConnectionId,
    pub tx: mpsc::Sender<ServerNachricht>,
}

impl ClientSender {
    /// Reiht eine Nachricht nicht-blockierend ein
    pub fn senden(&self, nachricht: ServerNachricht) -> SendeErgebnis {
        match self.tx.try_send(nachricht) {
            Ok(()) => SendeErgebnis::Eingereiht,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(conn_id = %self.conn_id, typ = n.typ(), "Send-Queue voll");
                SendeErgebnis::Voll
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn_id = %self.conn_id, "Send-Queue geschlossen (Client getrennt)");
                SendeErgebnis::Geschlossen
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self::mit_queue_groesse(DEFAULT_SEND_QUEUE_GROESSE)
    }

    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    pub fn client_registrieren(&self, conn_id: ConnectionId) -> mpsc::Receiver<ServerNachricht> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner.clients.insert(conn_id, ClientSender { conn_id, tx });
        tracing::debug!(conn_id = %conn_id, "Client im Broadcaster registriert");
        rx
    }

    pub fn client_entfernen(&self, conn_id: &ConnectionId) {
        if self.inner.clients.remove(conn_id).is_some() {
            tracing::debug!(conn_id = %conn_id, "Client aus Broadcaster entfernt");
        }
    }

    /// Reiht eine Nachricht fuer eine einzelne Verbindung ein
    ///
    /// Gibt `true` zurueck wenn die Nachricht eingereiht wurde.
    pub fn an_client_senden(&self, conn_id: &ConnectionId, nachricht: ServerNachricht) -> bool {
        let ergebnis = match self.inner.clients.get(conn_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(conn_id = %conn_id, "Senden an unbekannte Verbindung");
                return false;
            }
        };
        self.ergebnis_behandeln(conn_id, ergebnis)
    }

    /// Reiht eine Nachricht fuer alle Verbindungen ein
    ///
    /// Gibt die Anzahl der erfolgreichen Zustellungen zurueck.
    pub fn an_alle_senden(&self, nachricht: ServerNachricht) -> usize {
        let mut ueberlaufen = Vec::new();
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            match entry.value().senden(nachricht.clone()) {
                SendeErgebnis::Eingereiht => gesendet += 1,
                SendeErgebnis::Voll => ueberlaufen.push(*entry.key()),
                SendeErgebnis::Geschlossen => {}
            }
        });
        // Entfernen erst nach der Iteration (DashMap-Shard-Locks)
        for conn_id in &ueberlaufen {
            self.ueberlaufenden_client_trennen(conn_id);
        }
        gesendet
    }

    /// Fuehrt eine Liste von Zustell-Anweisungen in Reihenfolge aus
    pub fn zustellen(&self, ausgaenge: Vec<Ausgang>) {
        for ausgang in ausgaenge {
            match ausgang {
                Ausgang::An(conn_id, nachricht) => {
                    self.an_client_senden(&conn_id, nachricht);
                }
                Ausgang::AnAlle(nachricht) => {
                    self.an_alle_senden(nachricht);
                }
            }
        }
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, conn_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(conn_id)
    }

    fn ergebnis_behandeln(&self, conn_id: &ConnectionId, ergebnis: SendeErgebnis) -> bool {
        match ergebnis {
            SendeErgebnis::Eingereiht => true,
            SendeErgebnis::Voll => {
                self.ueberlaufenden_client_trennen(conn_id);
                false
            }
            SendeErgebnis::Geschlossen => false,
        }
    }

    fn ueberlaufenden_client_trennen(&self, conn_id: &ConnectionId) {
        // Sender fallen lassen: der Verbindungs-Task sieht `None` und beendet sich
        self.inner.clients.remove(conn_id);
        tracing::warn!(conn_id = %conn_id, "Client kommt nicht hinterher, Verbindung wird getrennt");
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use praxisruf_core::types::SessionId;
    use praxisruf_protocol::nachricht::{Beendigungsgrund, PresenceSnapshot};

    fn test_nachricht() -> ServerNachricht {
        ServerNachricht::hangup(SessionId::new(), Beendigungsgrund::Hangup)
    }

    #[tokio::test]
    async fn client_registrieren_und_senden() {
        let broadcaster = EventBroadcaster::neu();
        let id = ConnectionId::new();

        let mut rx = broadcaster.client_registrieren(id);
        assert!(broadcaster.ist_registriert(&id));

        let nachricht = test_nachricht();
        assert!(broadcaster.an_client_senden(&id, nachricht.clone()));
        assert_eq!(rx.try_recv().unwrap(), nachricht);
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let broadcaster = EventBroadcaster::neu();
        let mut receivers: Vec<_> = (0..5)
            .map(|_| broadcaster.client_registrieren(ConnectionId::new()))
            .collect();

        let gesendet =
            broadcaster.an_alle_senden(ServerNachricht::Presence(PresenceSnapshot::default()));
        assert_eq!(gesendet, 5);
        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn zustellen_behaelt_reihenfolge() {
        let broadcaster = EventBroadcaster::neu();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut rx_a = broadcaster.client_registrieren(a);
        let mut rx_b = broadcaster.client_registrieren(b);

        let erste = test_nachricht();
        let zweite = ServerNachricht::Presence(PresenceSnapshot::default());
        broadcaster.zustellen(vec![
            Ausgang::An(a, erste.clone()),
            Ausgang::AnAlle(zweite.clone()),
        ]);

        assert_eq!(rx_a.try_recv().unwrap(), erste);
        assert_eq!(rx_a.try_recv().unwrap(), zweite);
        assert_eq!(rx_b.try_recv().unwrap(), zweite);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn volle_queue_trennt_client() {
        let broadcaster = EventBroadcaster::mit_queue_groesse(1);
        let id = ConnectionId::new();
        let mut rx = broadcaster.client_registrieren(id);

        assert!(broadcaster.an_client_senden(&id, test_nachricht()));
        assert!(!broadcaster.an_client_senden(&id, test_nachricht()));
        assert!(!broadcaster.ist_registriert(&id));

        // Eingereihte Nachricht kommt noch an, danach ist die Queue zu
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn client_entfernen() {
        let broadcaster = EventBroadcaster::neu();
        let id = ConnectionId::new();
        let _rx = broadcaster.client_registrieren(id);
        assert_eq!(broadcaster.client_anzahl(), 1);

        broadcaster.client_entfernen(&id);
        assert!(!broadcaster.ist_registriert(&id));
        assert!(!broadcaster.an_client_senden(&id, test_nachricht()));
    }
}
