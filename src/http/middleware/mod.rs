//! HTTP middleware.
//!
//! # Data Flow
//! ```text
//! Root layers (whole router, outermost first):
//!     panic recovery → request id → ingress.rs (request context)
//!
//! Per route (chain.rs builds it):
//!     allowed_methods → trace.rs → content_limit → timeout.rs
//!     → auth.rs → rate_limit → handler
//! ```

pub mod auth;
pub mod chain;
pub mod ingress;
pub mod timeout;
pub mod trace;

pub use chain::{ChainError, RouteChain, Stage};
