//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream call:
//!     → deadline from RequestContext bounds the whole call
//!     → On transport failure: retries.rs (idempotent only, retry once)
//!     → backoff.rs (jittered exponential delay, never past the deadline)
//! Startup:
//!     → backoff.rs paces cache connection attempts
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent operations
//! - Every loop is bounded by attempts and by the deadline

pub mod backoff;
pub mod retries;
