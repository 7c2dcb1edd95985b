//! Presence-Handler – Register, Logout, Presence-Abfrage
//!
//! Jede Aenderung der Teilnehmermenge erzeugt einen vollstaendigen
//! Presence-Schnappschuss an alle Verbindungen.

use praxisruf_core::types::ConnectionId;
use praxisruf_protocol::nachricht::{
    Beendigungsgrund, RegisterRequest, RoomReady, ServerNachricht,
};

use crate::broadcast::Ausgang;
use crate::dispatcher::RelayKern;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::Bindung;

/// Verarbeitet `register`
///
/// Antwortet dem Absender mit `registered`, benachrichtigt ein frueheres
/// Raum-Mitglied mit `room.ready` und verteilt die neue Presence-Liste.
pub fn handle_register(
    kern: &mut RelayKern,
    absender: ConnectionId,
    request: RegisterRequest,
) -> SignalingResult<Vec<Ausgang>> {
    let bindung = Bindung::aus_raum(request.room);
    let teilnehmer = kern
        .registry
        .registrieren(absender, request.display_name, request.role, bindung)?
        .clone();

    let mut ausgaenge = vec![Ausgang::An(
        absender,
        ServerNachricht::Registered(teilnehmer.als_registered()),
    )];

    if let Bindung::Raum(raum) = &teilnehmer.bindung {
        for frueher in kern
            .registry
            .raum_mitglieder(raum)
            .into_iter()
            .filter(|t| t.id != absender)
        {
            tracing::info!(raum = %raum, conn_id = %frueher.id, peer = %absender, "Raum vollstaendig");
            ausgaenge.push(Ausgang::An(
                frueher.id,
                ServerNachricht::RoomReady(RoomReady {
                    room: raum.clone(),
                    peer_id: absender,
                    peer_name: teilnehmer.anzeigename.clone(),
                    peer_role: teilnehmer.rolle,
                }),
            ));
        }
    }

    ausgaenge.push(Ausgang::AnAlle(ServerNachricht::Presence(
        kern.registry.schnappschuss(),
    )));
    Ok(ausgaenge)
}

/// Verarbeitet `logout`: Abmelden ohne die Verbindung zu schliessen
///
/// Eine laufende Sitzung endet wie bei einer Trennung; der Absender erhaelt
/// zusaetzlich selbst die `hangup`-Benachrichtigung.
pub fn handle_logout(kern: &mut RelayKern, absender: ConnectionId) -> SignalingResult<Vec<Ausgang>> {
    if !kern.registry.existiert(&absender) {
        return Err(SignalingError::NichtRegistriert);
    }
    let eigene_sitzung = kern.sitzungen.sitzung_von(&absender).map(|s| s.id);

    let mut ausgaenge = Vec::new();
    if let Some(session_id) = eigene_sitzung {
        ausgaenge.push(Ausgang::An(
            absender,
            ServerNachricht::hangup(session_id, Beendigungsgrund::Disconnect),
        ));
    }
    ausgaenge.extend(kern.teilnehmer_entfernen(absender));
    Ok(ausgaenge)
}

/// Verarbeitet `presence.request` (auch ohne Anmeldung erlaubt)
pub fn handle_presence_request(kern: &RelayKern, absender: ConnectionId) -> Vec<Ausgang> {
    vec![Ausgang::An(
        absender,
        ServerNachricht::Presence(kern.registry.schnappschuss()),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxisruf_core::types::Rolle;

    fn register(name: &str, rolle: Rolle, raum: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            display_name: name.into(),
            role: rolle,
            room: raum.map(str::to_string),
        }
    }

    #[test]
    fn register_bestaetigt_und_verteilt_presence() {
        let mut kern = RelayKern::neu();
        let id = ConnectionId::new();
        let aus = handle_register(&mut kern, id, register("Alice", Rolle::Arzt, None)).unwrap();

        assert_eq!(aus.len(), 2);
        match &aus[0] {
            Ausgang::An(ziel, ServerNachricht::Registered(r)) => {
                assert_eq!(*ziel, id);
                assert_eq!(r.id, id);
                assert_eq!(r.display_name, "Alice");
            }
            andere => panic!("Erwartet registered, erhalten {andere:?}"),
        }
        match &aus[1] {
            Ausgang::AnAlle(ServerNachricht::Presence(p)) => assert_eq!(p.doctors.len(), 1),
            andere => panic!("Erwartet Presence-Broadcast, erhalten {andere:?}"),
        }
    }

    #[test]
    fn zweiter_im_raum_loest_room_ready_aus() {
        let mut kern = RelayKern::neu();
        let arzt = ConnectionId::new();
        let patient = ConnectionId::new();
        handle_register(&mut kern, arzt, register("Alice", Rolle::Arzt, Some("r1"))).unwrap();
        let aus =
            handle_register(&mut kern, patient, register("Bob", Rolle::Patient, Some("r1"))).unwrap();

        let ready = aus.iter().find_map(|a| match a {
            Ausgang::An(ziel, ServerNachricht::RoomReady(r)) => Some((*ziel, r.clone())),
            _ => None,
        });
        let (ziel, ready) = ready.expect("room.ready fehlt");
        assert_eq!(ziel, arzt);
        assert_eq!(ready.peer_id, patient);
        assert_eq!(ready.peer_name, "Bob");
        assert_eq!(ready.room, "r1");
    }

    #[test]
    fn logout_ohne_anmeldung() {
        let mut kern = RelayKern::neu();
        let fehler = handle_logout(&mut kern, ConnectionId::new()).unwrap_err();
        assert_eq!(fehler, SignalingError::NichtRegistriert);
    }

    #[test]
    fn logout_entfernt_aus_presence() {
        let mut kern = RelayKern::neu();
        let id = ConnectionId::new();
        handle_register(&mut kern, id, register("Alice", Rolle::Arzt, None)).unwrap();

        let aus = handle_logout(&mut kern, id).unwrap();
        assert!(!kern.registry.existiert(&id));
        assert!(aus.iter().any(|a| matches!(
            a,
            Ausgang::AnAlle(ServerNachricht::Presence(p)) if p.doctors.is_empty()
        )));
    }

    #[test]
    fn presence_request_nur_an_absender() {
        let kern = RelayKern::neu();
        let id = ConnectionId::new();
        let aus = handle_presence_request(&kern, id);
        assert!(matches!(&aus[..], [Ausgang::An(z, ServerNachricht::Presence(_))] if *z == id));
    }
}
