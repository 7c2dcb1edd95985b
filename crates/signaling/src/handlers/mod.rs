//! Handler fuer alle Client-Nachrichten
//!
//! Jeder Handler arbeitet synchron auf dem `RelayKern` (unter dem
//! Relay-Mutex) und gibt Zustell-Anweisungen zurueck. Kein Handler
//! fuehrt I/O aus.

pub mod call_handler;
pub mod presence_handler;
pub mod signal_handler;
