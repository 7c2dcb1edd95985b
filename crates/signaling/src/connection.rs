//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task liest Frames, reicht Textnachrichten an das Relay
//! weiter und schreibt die Send-Queue der Verbindung auf den Socket.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt laenger als `verbindungs_timeout_sek` kein Frame, wird getrennt
//!
//! Beim Verlassen der Schleife wird immer `Relay::trennen` aufgerufen.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::server_state::SignalingState;

/// Warum die Verbindungsschleife beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trennungsgrund {
    /// Client hat geschlossen oder der Stream ist zu Ende
    ClientGeschlossen,
    /// Lese- oder Schreibfehler auf dem Socket
    SocketFehler,
    /// Kein Frame innerhalb des Verbindungs-Timeouts
    Timeout,
    /// Send-Queue uebergelaufen, Broadcaster hat die Verbindung verworfen
    Ueberlastet,
    /// Server faehrt herunter
    Shutdown,
}

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht.
    pub async fn verarbeiten(
        self,
        socket: WebSocket,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Trennungsgrund {
        let peer_addr = self.peer_addr;
        let relay = &self.state.relay;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        let (conn_id, mut sende_rx) = relay.verbinden();
        tracing::info!(peer = %peer_addr, conn_id = %conn_id, "Neue Verbindung");

        let (mut ws_sender, mut ws_receiver) = socket.split();

        let mut letzter_empfang = Instant::now();
        let mut ping_takt = tokio::time::interval_at(
            tokio::time::Instant::now() + keepalive_intervall,
            keepalive_intervall,
        );
        ping_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let grund = loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(conn_id = %conn_id, laenge = text.len(), "Frame empfangen");
                            relay.text_empfangen(conn_id, &text);
                        }
                        Some(Ok(Message::Binary(daten))) => {
                            // JSON in Binaer-Frames wird toleriert
                            letzter_empfang = Instant::now();
                            relay.binaer_empfangen(conn_id, &daten);
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            // Pong auf Ping beantwortet axum selbst
                            letzter_empfang = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            break Trennungsgrund::ClientGeschlossen;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(conn_id = %conn_id, fehler = %e, "WebSocket-Lesefehler");
                            break Trennungsgrund::SocketFehler;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                ausgehend = sende_rx.recv() => {
                    let Some(nachricht) = ausgehend else {
                        break Trennungsgrund::Ueberlastet;
                    };
                    let json = match nachricht.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(conn_id = %conn_id, fehler = %e, "Serialisierung fehlgeschlagen");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(Message::Text(json)).await {
                        tracing::warn!(conn_id = %conn_id, fehler = %e, "Senden fehlgeschlagen");
                        break Trennungsgrund::SocketFehler;
                    }
                }

                // Keepalive
                _ = ping_takt.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(conn_id = %conn_id, "Verbindungs-Timeout");
                        break Trennungsgrund::Timeout;
                    }
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break Trennungsgrund::SocketFehler;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = ws_sender
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AWAY,
                                reason: "Server wird beendet".into(),
                            })))
                            .await;
                        break Trennungsgrund::Shutdown;
                    }
                }
            }
        };

        relay.trennen(conn_id);
        let _ = ws_sender.close().await;
        tracing::info!(peer = %peer_addr, conn_id = %conn_id, grund = ?grund, "Verbindung getrennt");
        grund
    }
}
