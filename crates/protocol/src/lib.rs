//! praxisruf-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Relay ueber die WebSocket-Verbindung ausgetauscht werden, sowie den
//! JSON-Umschlag (`type` + `payload`) in dem sie transportiert werden.

pub mod nachricht;
pub mod wire;

pub use nachricht::{ClientNachricht, ErrorCode, ServerNachricht};
pub use wire::{CodecFehler, MessageCodec};
