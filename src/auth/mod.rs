//! Bearer token authentication.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <jwt>
//!     → verifier.rs (HS256 signature, exp/nbf/iss)
//!     → cache `revoked:<sid>` lookup
//!     → Principal installed into the request context
//! ```
//!
//! # Design Decisions
//! - Verification is stateless apart from the revocation lookup
//! - Revocation lookups fail closed

pub mod verifier;

pub use verifier::{AuthError, Claims, TokenVerifier};
