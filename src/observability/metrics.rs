//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rate_limited_total` (counter): rejections by scope
//! - `gateway_downstream_state` (gauge): 1=ready, 0=otherwise, per service
//! - `gateway_downstream_calls_total` (counter): RPC outcomes per service/method
//! - `gateway_cache_errors_total` (counter): cache failures by operation

use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Returns `None` if a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// Record a completed HTTP request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let route = route.to_string();
    counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(scope: &str) {
    counter!("gateway_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

pub fn record_downstream_state(service: &str, ready: bool) {
    gauge!("gateway_downstream_state", "service" => service.to_string())
        .set(if ready { 1.0 } else { 0.0 });
}

pub fn record_downstream_call(service: &str, method: &str, outcome: &'static str) {
    counter!(
        "gateway_downstream_calls_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cache_error(operation: &'static str) {
    counter!("gateway_cache_errors_total", "operation" => operation).increment(1);
}
