//! WebSocket-Listener – Bindet Socket, nimmt Upgrades an
//!
//! Der `SignalingServer` stellt auf einem Port bereit:
//! - `GET /ws`        – WebSocket-Upgrade, pro Verbindung ein `ClientConnection`-Task
//! - `GET /api/users` – Read-only Presence-Spiegel (REST)
//!
//! Jedes Upgrade reserviert vorher einen Verbindungsplatz; ist keiner frei,
//! wird mit HTTP 503 abgelehnt. Der Platz wird erst freigegeben, wenn der
//! Verbindungs-Task endet.

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use praxisruf_core::types::Rolle;
use praxisruf_observability::{request_timing_layer, timing_middleware};
use praxisruf_protocol::nachricht::PresenceSnapshot;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::connection::ClientConnection;
use crate::server_state::SignalingState;

/// Zustand der HTTP-Handler
#[derive(Clone)]
struct HttpState {
    signaling: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
}

impl SignalingServer {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Baut den Router (`/ws` und `/api/users`)
    pub fn router(state: Arc<SignalingState>, shutdown_rx: watch::Receiver<bool>) -> Router {
        let metriken = state.metriken.clone();
        let http_state = HttpState {
            signaling: state,
            shutdown_rx,
        };

        let api = Router::new()
            .route("/api/users", get(benutzer_liste))
            .layer(CorsLayer::permissive())
            .layer(axum::middleware::from_fn_with_state(
                metriken,
                timing_middleware,
            ));

        Router::new()
            .route("/ws", get(ws_upgrade))
            .merge(api)
            .layer(request_timing_layer())
            .with_state(http_state)
    }

    /// Bedient Verbindungen auf einem bereits gebundenen Listener
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn mit_listener(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            server_name = %self.state.config.server_name,
            max_clients = self.state.config.max_clients,
            "WebSocket Signaling-Server gestartet"
        );

        let app = Self::router(self.state, shutdown_rx.clone());
        let mut shutdown = shutdown_rx;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<HttpState>,
) -> Response {
    let signaling = state.signaling;
    // Reservierung vor der 101-Antwort, sonst koennen parallele Upgrades
    // das Limit gemeinsam ueberschreiten
    let Some(platz) = signaling.platz_reservieren() else {
        tracing::warn!(
            peer = %peer_addr,
            max = signaling.config.max_clients,
            "Server voll, Verbindung abgelehnt"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server ist voll").into_response();
    };

    let shutdown_rx = state.shutdown_rx;
    ws.on_upgrade(move |socket| async move {
        ClientConnection::neu(signaling, peer_addr)
            .verarbeiten(socket, shutdown_rx)
            .await;
        drop(platz);
    })
}

#[derive(Debug, Deserialize)]
struct BenutzerFilter {
    role: Option<Rolle>,
}

/// `GET /api/users[?role=doctor|patient]` – Presence-Schnappschuss
async fn benutzer_liste(
    State(state): State<HttpState>,
    Query(filter): Query<BenutzerFilter>,
) -> Json<PresenceSnapshot> {
    let mut snapshot = state.signaling.relay.presence();
    match filter.role {
        Some(Rolle::Arzt) => snapshot.patients.clear(),
        Some(Rolle::Patient) => snapshot.doctors.clear(),
        None => {}
    }
    Json(snapshot)
}
