//! Route handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use tracing::debug;

use dsmr_metrics::{render_prometheus, IngestStatus};

use crate::ApiState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET <telemetry path>
///
/// Always 200: after ingestion stops the last known readings are served,
/// with `dsmr_ingest_up 0` and the per-reading timestamps showing staleness.
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    debug!(readings = snapshot.readings.len(), "scrape");
    let body = render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        body,
    )
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    match state.metrics.ingest_status() {
        IngestStatus::Running => (StatusCode::OK, "ok".to_string()),
        IngestStatus::Stopped(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("ingestion stopped: {reason}"),
        ),
    }
}

/// GET /
pub async fn landing_page(State(state): State<ApiState>) -> impl IntoResponse {
    Html(format!(
        "<html>\n<head><title>DSMR Exporter</title></head>\n<body>\n\
         <h1>DSMR Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        path = state.telemetry_path
    ))
}
