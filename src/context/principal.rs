//! Authenticated caller identity.

use serde::Serialize;

/// Identity derived from a verified bearer token.
///
/// Created once per request by the auth verifier and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: u64,
    pub session_id: String,
    /// Seconds since the Unix epoch.
    pub issued_at: u64,
    /// Seconds since the Unix epoch.
    pub expires_at: u64,
}
