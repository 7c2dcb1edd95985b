//! Call-Handler – Anruf anfragen, annehmen, ablehnen

use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::nachricht::{
    CallIncoming, CallRequest, CallRinging, ServerNachricht, SessionRef,
};
use std::time::Instant;

use crate::broadcast::Ausgang;
use crate::dispatcher::RelayKern;
use crate::error::{SignalingError, SignalingResult};

/// Verarbeitet `call.request`
///
/// Der Angerufene erhaelt `call.incoming`, der Anrufer `call.ringing` mit
/// der neuen Sitzungs-ID.
pub fn handle_call_request(
    kern: &mut RelayKern,
    absender: ConnectionId,
    request: CallRequest,
    jetzt: Instant,
) -> SignalingResult<Vec<Ausgang>> {
    let sitzung = kern
        .sitzungen
        .anrufen(&kern.registry, absender, request.target_id, jetzt)?;
    let (session_id, responder) = (sitzung.id, sitzung.responder);

    let anrufer = kern
        .registry
        .teilnehmer(&absender)
        .ok_or(SignalingError::NichtRegistriert)?;

    Ok(vec![
        Ausgang::An(
            responder,
            ServerNachricht::CallIncoming(CallIncoming {
                session_id,
                from_id: absender,
                from_name: anrufer.anzeigename.clone(),
                from_role: anrufer.rolle,
            }),
        ),
        Ausgang::An(
            absender,
            ServerNachricht::CallRinging(CallRinging {
                session_id,
                target_id: responder,
            }),
        ),
    ])
}

/// Verarbeitet `call.accept`; der Anrufer erhaelt `call.accepted`
pub fn handle_call_accept(
    kern: &mut RelayKern,
    absender: ConnectionId,
    referenz: SessionRef,
) -> SignalingResult<Vec<Ausgang>> {
    let sitzung = kern.sitzungen.annehmen(absender, referenz.session_id)?;
    Ok(vec![Ausgang::An(
        sitzung.initiator,
        ServerNachricht::CallAccepted(referenz),
    )])
}

/// Verarbeitet `call.decline`; der Anrufer erhaelt `call.declined`
pub fn handle_call_decline(
    kern: &mut RelayKern,
    absender: ConnectionId,
    referenz: SessionRef,
) -> SignalingResult<Vec<Ausgang>> {
    let sitzung = kern.sitzungen.ablehnen(absender, referenz.session_id)?;
    Ok(vec![Ausgang::An(
        sitzung.initiator,
        ServerNachricht::CallDeclined(referenz),
    )])
}
