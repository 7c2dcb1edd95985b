//! praxisruf-signaling – WebSocket-Signaling-Relay
//!
//! Dieser Crate implementiert Presence und Anruf-Aufbau fuer Praxisruf.
//! Er verwaltet WebSocket-Verbindungen, fuehrt Buch ueber angemeldete
//! Aerzte und Patienten und leitet SDP-Angebote, -Antworten und
//! ICE-Kandidaten zwischen genau zwei Teilnehmern einer Sitzung weiter.
//! Medien fliessen nie durch das Relay.
//!
//! ## Architektur
//!
//! ```text
//! axum Router (SignalingServer)
//!     |  /ws  /api/users
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! Relay  ── Mutex<RelayKern> ──┬── ConnectionRegistry (wer ist da)
//!     |                        +── CallSessionManager (wer spricht mit wem)
//!     |                        +── dispatch() -> handlers
//!     v
//! EventBroadcaster – Send-Queues aller offenen Verbindungen
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod server_state;
pub mod sessions;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::{Ausgang, EventBroadcaster};
pub use connection::ClientConnection;
pub use dispatcher::RelayKern;
pub use error::{SignalingError, SignalingResult};
pub use registry::{Bindung, ConnectionRegistry};
pub use relay::Relay;
pub use server_state::{SignalingConfig, SignalingState};
pub use sessions::{AnrufZustand, CallSession, CallSessionManager};
pub use ws::SignalingServer;
