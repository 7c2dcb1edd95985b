//! Integration-Tests fuer den WebSocket-Server (echter TCP-Socket)

use futures_util::{SinkExt, StreamExt};
use praxisruf_core::ConnectionId;
use praxisruf_observability::PraxisrufMetrics;
use praxisruf_protocol::nachricht::Beendigungsgrund;
use praxisruf_protocol::ServerNachricht;
use praxisruf_signaling::{SignalingConfig, SignalingServer, SignalingState};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsFehler, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARTEZEIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Hilfen
// ---------------------------------------------------------------------------

async fn server_starten(
    config: SignalingConfig,
) -> (SocketAddr, Arc<SignalingState>, watch::Sender<bool>) {
    let state = SignalingState::neu(config, PraxisrufMetrics::neu().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = SignalingServer::neu(Arc::clone(&state));
    tokio::spawn(async move {
        server.mit_listener(listener, shutdown_rx).await.unwrap();
    });
    (addr, state, shutdown_tx)
}

async fn verbinden(addr: SocketAddr) -> Result<Ws, WsFehler> {
    connect_async(format!("ws://{addr}/ws"))
        .await
        .map(|(ws, _antwort)| ws)
}

async fn senden(ws: &mut Ws, typ: &str, payload: serde_json::Value) {
    let text = json!({ "type": typ, "payload": payload }).to_string();
    ws.send(Message::Text(text)).await.unwrap();
}

/// Naechster Frame vom Server (Pings werden uebersprungen)
async fn frame_lesen(ws: &mut Ws) -> Message {
    loop {
        let frame = timeout(WARTEZEIT, ws.next())
            .await
            .expect("Kein Frame innerhalb der Wartezeit")
            .expect("Stream vorzeitig beendet")
            .unwrap();
        if !matches!(frame, Message::Ping(_) | Message::Pong(_)) {
            return frame;
        }
    }
}

async fn nachricht_lesen(ws: &mut Ws) -> ServerNachricht {
    match frame_lesen(ws).await {
        Message::Text(text) => ServerNachricht::from_json(&text).unwrap(),
        andere => panic!("Erwartet Text-Frame, erhalten {andere:?}"),
    }
}

async fn registrieren(ws: &mut Ws, name: &str, rolle: &str) -> ConnectionId {
    senden(ws, "register", json!({ "displayName": name, "role": rolle })).await;
    match nachricht_lesen(ws).await {
        ServerNachricht::Registered(r) => r.id,
        andere => panic!("Erwartet registered, erhalten {andere:?}"),
    }
}

/// HTTP-Status einer abgelehnten Verbindung
fn abgelehnt_mit(ergebnis: &Result<Ws, WsFehler>) -> Option<u16> {
    match ergebnis {
        Err(WsFehler::Http(antwort)) => Some(antwort.status().as_u16()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anmeldung_und_anruf_ueber_websocket() {
    let (addr, state, _shutdown) = server_starten(SignalingConfig::default()).await;

    let mut alice = verbinden(addr).await.unwrap();
    let mut bob = verbinden(addr).await.unwrap();

    registrieren(&mut alice, "Alice", "doctor").await;
    assert!(matches!(nachricht_lesen(&mut alice).await, ServerNachricht::Presence(_)));

    let bob_id = registrieren(&mut bob, "Bob", "patient").await;
    match nachricht_lesen(&mut alice).await {
        ServerNachricht::Presence(p) => assert_eq!(p.patients[0].id, bob_id),
        andere => panic!("Erwartet presence, erhalten {andere:?}"),
    }
    assert!(matches!(nachricht_lesen(&mut bob).await, ServerNachricht::Presence(_)));

    senden(&mut alice, "call.request", json!({ "targetId": bob_id })).await;
    match nachricht_lesen(&mut bob).await {
        ServerNachricht::CallIncoming(c) => assert_eq!(c.from_name, "Alice"),
        andere => panic!("Erwartet call.incoming, erhalten {andere:?}"),
    }
    assert!(matches!(
        nachricht_lesen(&mut alice).await,
        ServerNachricht::CallRinging(_)
    ));
    assert_eq!(state.relay.aktive_sitzungen(), 1);

    // Socket schliessen beendet die Sitzung, Alice wird benachrichtigt
    bob.close(None).await.unwrap();
    match nachricht_lesen(&mut alice).await {
        ServerNachricht::Hangup(h) => assert_eq!(h.reason, Some(Beendigungsgrund::Disconnect)),
        andere => panic!("Erwartet hangup, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn server_voll_lehnt_upgrade_ab() {
    let config = SignalingConfig {
        max_clients: 1,
        ..Default::default()
    };
    let (addr, _state, _shutdown) = server_starten(config).await;

    let mut erster = verbinden(addr).await.unwrap();
    senden(&mut erster, "presence.request", json!({})).await;
    assert!(matches!(nachricht_lesen(&mut erster).await, ServerNachricht::Presence(_)));

    let zweiter = verbinden(addr).await;
    assert_eq!(abgelehnt_mit(&zweiter), Some(503));

    // Nach dem Schliessen ist der Platz wieder frei
    erster.close(None).await.unwrap();
    let _ = timeout(WARTEZEIT, async { while erster.next().await.is_some() {} }).await;
    let mut dritter = None;
    for _ in 0..50 {
        if let Ok(ws) = verbinden(addr).await {
            dritter = Some(ws);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(dritter.is_some(), "Platz wurde nicht freigegeben");
}

#[tokio::test]
async fn parallele_upgrades_ueberschreiten_das_limit_nicht() {
    let config = SignalingConfig {
        max_clients: 1,
        ..Default::default()
    };
    let (addr, state, _shutdown) = server_starten(config).await;

    let versuche: Vec<_> = (0..10)
        .map(|_| tokio::spawn(verbinden(addr)))
        .collect();
    let mut offen = Vec::new();
    let mut abgelehnt = 0;
    for versuch in versuche {
        let ergebnis = versuch.await.unwrap();
        match abgelehnt_mit(&ergebnis) {
            Some(503) => abgelehnt += 1,
            Some(status) => panic!("Unerwarteter Status {status}"),
            None => offen.push(ergebnis.unwrap()),
        }
    }

    assert_eq!(offen.len(), 1);
    assert_eq!(abgelehnt, 9);
    assert!(state.relay.verbindungen() <= 1);
}

#[tokio::test]
async fn ungueltige_nachricht_haelt_verbindung_offen() {
    let (addr, _state, _shutdown) = server_starten(SignalingConfig::default()).await;
    let mut client = verbinden(addr).await.unwrap();

    client.send(Message::Text("{kaputt".into())).await.unwrap();
    assert!(matches!(nachricht_lesen(&mut client).await, ServerNachricht::Error(_)));

    client
        .send(Message::Text(r#"{"type":"presence.request"}"#.into()))
        .await
        .unwrap();
    assert!(matches!(nachricht_lesen(&mut client).await, ServerNachricht::Presence(_)));
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen() {
    let (addr, state, shutdown) = server_starten(SignalingConfig::default()).await;
    let mut client = verbinden(addr).await.unwrap();
    registrieren(&mut client, "Alice", "doctor").await;
    let _ = nachricht_lesen(&mut client).await; // presence

    shutdown.send(true).unwrap();
    match frame_lesen(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        andere => panic!("Erwartet Close-Frame, erhalten {andere:?}"),
    }

    // Aufraeumen laeuft direkt nach dem Close-Frame
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.relay.presence().doctors.is_empty());
}
