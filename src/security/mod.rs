//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (method allowed? declared body within limit?)
//!     → [authentication, see crate::auth]
//!     → rate_limit.rs (per scope/subject/window counter in the cache)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - Cheap checks first: method and size before any cache round trip
//! - Rate limiting fails open; authentication fails closed
//! - No trust in client-supplied identity headers

pub mod limits;
pub mod rate_limit;
