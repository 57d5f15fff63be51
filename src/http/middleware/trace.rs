//! Per-request access log and latency metric.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::context::Principal;
use crate::http::request::context_of;
use crate::http::response::ErrorCode;
use crate::observability::metrics;

/// Route label used in logs and metrics.
#[derive(Debug, Clone, Copy)]
pub struct RouteLabel(pub &'static str);

pub async fn trace(State(RouteLabel(route)): State<RouteLabel>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let ctx = context_of(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    // Inner stages report the principal and error code through response extensions.
    let user_id = response.extensions().get::<Principal>().map(|p| p.user_id);
    let code = response.extensions().get::<ErrorCode>().map(ErrorCode::as_str);
    let duration_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::warn!(
            request_id = %ctx.request_id(),
            trace_id = %ctx.trace_id(),
            method = %method,
            path = %path,
            status = status.as_u16(),
            code,
            user_id,
            duration_ms,
            "Request failed"
        );
    } else {
        tracing::info!(
            request_id = %ctx.request_id(),
            trace_id = %ctx.trace_id(),
            method = %method,
            path = %path,
            status = status.as_u16(),
            code,
            user_id,
            duration_ms,
            "Request completed"
        );
    }
    metrics::record_request(route, method.as_str(), status.as_u16(), start);

    response
}
