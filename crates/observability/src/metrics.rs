//! Prometheus-kompatible Metriken fuer Praxisruf
//!
//! Registrierte Metriken:
//! - `praxisruf_connected_clients` – Gauge: Offene WebSocket-Verbindungen
//! - `praxisruf_registered_participants` – Gauge: Angemeldete Teilnehmer
//! - `praxisruf_call_sessions_active` – Gauge: Nicht beendete Anruf-Sitzungen
//! - `praxisruf_calls_total` – Counter: Beendete Sitzungen (ausgang)
//! - `praxisruf_signals_relayed_total` – Counter: Weitergeleitete Nachrichten (typ)
//! - `praxisruf_rejections_total` – Counter: Abgelehnte Nachrichten (code)
//! - `praxisruf_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `praxisruf_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Praxisruf-Prometheus-Metriken
#[derive(Clone)]
pub struct PraxisrufMetrics {
    pub registry: Arc<Registry>,

    // Signaling-Metriken
    pub connected_clients: IntGauge,
    pub registered_participants: IntGauge,
    pub call_sessions_active: IntGauge,
    pub calls_total: IntCounterVec,
    pub signals_relayed_total: IntCounterVec,
    pub rejections_total: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl PraxisrufMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Signaling-Metriken ---
        let connected_clients = IntGauge::with_opts(Opts::new(
            "praxisruf_connected_clients",
            "Anzahl offener WebSocket-Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let registered_participants = IntGauge::with_opts(Opts::new(
            "praxisruf_registered_participants",
            "Anzahl angemeldeter Teilnehmer",
        ))?;
        registry.register(Box::new(registered_participants.clone()))?;

        let call_sessions_active = IntGauge::with_opts(Opts::new(
            "praxisruf_call_sessions_active",
            "Anzahl nicht beendeter Anruf-Sitzungen",
        ))?;
        registry.register(Box::new(call_sessions_active.clone()))?;

        let calls_total = IntCounterVec::new(
            Opts::new("praxisruf_calls_total", "Beendete Anruf-Sitzungen nach Ausgang"),
            &["ausgang"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let signals_relayed_total = IntCounterVec::new(
            Opts::new(
                "praxisruf_signals_relayed_total",
                "Weitergeleitete Signaling-Nachrichten nach Typ",
            ),
            &["typ"],
        )?;
        registry.register(Box::new(signals_relayed_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "praxisruf_rejections_total",
                "Abgelehnte Client-Nachrichten nach Fehler-Code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("praxisruf_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "praxisruf_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            registered_participants,
            call_sessions_active,
            calls_total,
            signals_relayed_total,
            rejections_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: PraxisrufMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<PraxisrufMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
