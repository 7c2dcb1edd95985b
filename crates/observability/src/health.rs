//! Health-Check-Endpunkt fuer Praxisruf
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Teilnehmerzahl pro Rolle

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub doctors: usize,
    pub patients: usize,
}

/// Quelle fuer die aktuelle Teilnehmerzahl
///
/// Wird vom Signaling-Relay implementiert, damit dieses Crate nicht vom
/// Signaling-Crate abhaengt.
pub trait PresenceZaehler: Send + Sync + 'static {
    /// Gibt (Aerzte, Patienten) zurueck
    fn teilnehmer_zaehlen(&self) -> (usize, usize);
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    bereit: Arc<AtomicBool>,
    presence: Arc<dyn PresenceZaehler>,
}

impl HealthState {
    pub fn neu(presence: Arc<dyn PresenceZaehler>) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            bereit: Arc::new(AtomicBool::new(true)),
            presence,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn ist_bereit(&self) -> bool {
        self.bereit.load(Ordering::Relaxed)
    }

    /// Markiert den Dienst als nicht mehr bereit (z.B. waehrend des Shutdowns)
    pub fn bereit_setzen(&self, bereit: bool) {
        self.bereit.store(bereit, Ordering::Relaxed);
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (status, http_status) = if state.ist_bereit() {
        (HealthStatus::Healthy, StatusCode::OK)
    } else {
        (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };
    let (doctors, patients) = state.presence.teilnehmer_zaehlen();

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        doctors,
        patients,
    };

    (http_status, Json(response))
}
