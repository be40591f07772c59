//! dsmr-api — HTTP surface of the exporter.
//!
//! Provides axum route handlers that read the shared metric state. Scrapes
//! keep succeeding after ingestion stops; `/healthz` is what turns red.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Landing page linking to the metrics path |
//! | GET | `/healthz` | 200 while ingesting, 503 once ingestion stopped |
//! | GET | `<telemetry path>` | Prometheus exposition (default `/metrics`) |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use dsmr_metrics::MetricState;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<MetricState>,
    pub telemetry_path: String,
}

/// Build the complete router.
pub fn build_router(metrics: Arc<MetricState>, telemetry_path: &str) -> Router {
    let state = ApiState {
        metrics,
        telemetry_path: telemetry_path.to_string(),
    };

    Router::new()
        .route("/", get(handlers::landing_page))
        .route("/healthz", get(handlers::healthz))
        .route(telemetry_path, get(handlers::prometheus_metrics))
        .with_state(state)
}
