use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::response::ApiError;

/// Expected admin API key.
#[derive(Clone)]
pub struct AdminKey(pub Arc<str>);

pub async fn admin_auth(State(AdminKey(key)): State<AdminKey>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        // An empty configured key never matches.
        Some(token) if !key.is_empty() && token == &*key => next.run(request).await,
        _ => ApiError::unauthenticated("admin API key required").into_response(),
    }
}
