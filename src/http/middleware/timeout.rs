//! Per-route deadline.
//!
//! The context handed downstream carries the deadline, so RPCs and cache
//! calls never outlive it. On elapse the inner future is dropped and the
//! context's cancel token fires.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::request::context_of;
use crate::http::response::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct RouteTimeout(pub Duration);

pub async fn timeout(
    State(RouteTimeout(limit)): State<RouteTimeout>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = context_of(&request).child_with_timeout(limit);
    let budget = ctx.remaining().unwrap_or(limit);
    request.extensions_mut().insert(ctx.clone());

    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            ctx.cancel();
            tracing::warn!(
                request_id = %ctx.request_id(),
                timeout_ms = limit.as_millis() as u64,
                "Request deadline exceeded"
            );
            ApiError::deadline_exceeded().into_response()
        }
    }
}
