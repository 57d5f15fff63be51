//! Social Gateway Library
//!
//! HTTP edge gateway and cross-service RPC fabric for the social platform.

// Core subsystems
pub mod config;
pub mod context;
pub mod http;
pub mod rpc;
pub mod services;

// Shared infrastructure
pub mod auth;
pub mod cache;
pub mod health;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use crate::config::schema::GatewayConfig;
pub use crate::context::RequestContext;
pub use crate::http::{build_router, AppState, HttpServer};
pub use crate::lifecycle::{Shutdown, Supervisor};
