//! Admin/debug listener.
//!
//! # Responsibilities
//! - Report process phase, uptime and version
//! - Expose downstream connectivity snapshots
//! - Render Prometheus metrics
//!
//! # Design Decisions
//! - Served on its own listener so it can be firewalled separately
//! - Every route requires the configured API key as a bearer token

pub mod auth;
pub mod handlers;

pub use handlers::AdminState;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;

use self::auth::{admin_auth, AdminKey};
use self::handlers::{get_downstreams, get_metrics, get_status};

pub fn admin_router(state: AdminState, api_key: &str) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/downstreams", get(get_downstreams))
        .route("/metrics", get(get_metrics))
        .layer(from_fn_with_state(AdminKey(Arc::from(api_key)), admin_auth))
        .with_state(state)
}
