//! praxisruf-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Praxisruf-Crates gemeinsam genutzt werden: Verbindungs- und
//! Sitzungs-IDs sowie die Rolle eines Teilnehmers.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ConnectionId, Rolle, SessionId};
