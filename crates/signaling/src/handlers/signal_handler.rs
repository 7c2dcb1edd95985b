//! Signal-Handler – SDP-Angebot/-Antwort, ICE-Kandidaten, Auflegen
//!
//! SDP- und ICE-Inhalte werden unveraendert an das Gegenueber
//! weitergereicht. Der Sitzungszustand entscheidet nur, ob weitergeleitet
//! wird.

use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::nachricht::{
    Beendigungsgrund, IceSignal, SdpSignal, ServerNachricht, SessionRef,
};

use crate::broadcast::Ausgang;
use crate::dispatcher::RelayKern;
use crate::error::SignalingResult;

pub fn handle_offer(
    kern: &mut RelayKern,
    absender: ConnectionId,
    signal: SdpSignal,
) -> SignalingResult<Vec<Ausgang>> {
    let empfaenger = kern.sitzungen.angebot(absender, signal.session_id)?;
    tracing::debug!(session_id = %signal.session_id, von = %absender, an = %empfaenger, "Angebot weitergeleitet");
    Ok(vec![Ausgang::An(empfaenger, ServerNachricht::Offer(signal))])
}

pub fn handle_answer(
    kern: &mut RelayKern,
    absender: ConnectionId,
    signal: SdpSignal,
) -> SignalingResult<Vec<Ausgang>> {
    let empfaenger = kern.sitzungen.antwort(absender, signal.session_id)?;
    tracing::debug!(session_id = %signal.session_id, von = %absender, an = %empfaenger, "Antwort weitergeleitet");
    Ok(vec![Ausgang::An(empfaenger, ServerNachricht::Answer(signal))])
}

pub fn handle_ice_candidate(
    kern: &mut RelayKern,
    absender: ConnectionId,
    signal: IceSignal,
) -> SignalingResult<Vec<Ausgang>> {
    let empfaenger = kern.sitzungen.kandidat(absender, signal.session_id)?;
    tracing::trace!(session_id = %signal.session_id, von = %absender, "ICE-Kandidat weitergeleitet");
    Ok(vec![Ausgang::An(
        empfaenger,
        ServerNachricht::IceCandidate(signal),
    )])
}

/// Verarbeitet `hangup`: beide Teilnehmer erhalten dieselbe Bestaetigung
pub fn handle_hangup(
    kern: &mut RelayKern,
    absender: ConnectionId,
    referenz: SessionRef,
) -> SignalingResult<Vec<Ausgang>> {
    let sitzung = kern.sitzungen.auflegen(absender, referenz.session_id)?;
    let hinweis = ServerNachricht::hangup(sitzung.id, Beendigungsgrund::Hangup);
    Ok(vec![
        Ausgang::An(sitzung.initiator, hinweis.clone()),
        Ausgang::An(sitzung.responder, hinweis),
    ])
}
