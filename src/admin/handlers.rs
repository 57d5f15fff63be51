use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::watch;

use crate::lifecycle::Phase;
use crate::rpc::{DownstreamRegistry, DownstreamStatus};

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<DownstreamRegistry>,
    pub phase: watch::Receiver<Phase>,
    pub started: Instant,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub phase: String,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let phase = state.phase.borrow().to_string();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        phase,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_downstreams(State(state): State<AdminState>) -> Json<Vec<DownstreamStatus>> {
    Json(state.registry.snapshot())
}

pub async fn get_metrics(State(state): State<AdminState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
