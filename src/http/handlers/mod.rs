//! Route handlers: translate HTTP requests into downstream RPCs.
//!
//! # Responsibilities
//! - Parse queries and bodies with the strict extractors
//! - Call the typed service APIs with the request context
//! - Fan out independent calls under one deadline
//!
//! # Design Decisions
//! - Handlers hold no state beyond `AppState`
//! - Downstream errors map through `ApiError::from`; no handler invents codes

pub mod health;
pub mod profile;
pub mod session;
pub mod users;

use axum::http::Uri;

use crate::http::response::ApiError;

/// JSON 404 for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no route for {}", uri.path()))
}
