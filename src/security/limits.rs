//! Method and request-size limits.
//!
//! # Responsibilities
//! - Reject methods a route does not serve (405 + `Allow`)
//! - Reject declared bodies over the route limit before reading them (413)
//!
//! # Design Decisions
//! - Declared `Content-Length` is checked up front; the observed body is capped
//!   separately by `DefaultBodyLimit`, so lying clients still get 413
//! - Both checks run before authentication, so they cost no cache round trip

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::response::ApiError;

/// Methods served by a route.
#[derive(Debug, Clone)]
pub struct AllowedMethods(pub Arc<[Method]>);

pub async fn allowed_methods(
    State(AllowedMethods(methods)): State<AllowedMethods>,
    request: Request,
    next: Next,
) -> Response {
    if methods.contains(request.method()) {
        next.run(request).await
    } else {
        tracing::debug!(method = %request.method(), path = %request.uri().path(), "Method not allowed");
        ApiError::method_not_allowed(&methods).into_response()
    }
}

/// Body size limit in bytes for a route.
#[derive(Debug, Clone, Copy)]
pub struct ContentLimit(pub usize);

pub async fn content_limit(
    State(ContentLimit(limit)): State<ContentLimit>,
    request: Request,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(len) if len > limit as u64 => {
            tracing::debug!(declared = len, limit, "Request body too large");
            ApiError::payload_too_large(limit).into_response()
        }
        _ => next.run(request).await,
    }
}
