//! Passive health checking (failure detection from live traffic).
//!
//! # Responsibilities
//! - Observe downstream call outcomes
//! - Feed transport failures into the record's state machine
//!
//! # Design Decisions
//! - Only transport failures and timeouts count against a downstream
//! - Application errors (not found, invalid argument, ...) count as reachability successes
//! - Cancellation by the caller says nothing about the downstream and is ignored

use crate::rpc::RpcError;

/// What a finished call says about the downstream's reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Reachable,
    Unreachable,
    Unknown,
}

/// Classify a call result.
pub fn observe<T>(result: &Result<T, RpcError>) -> Observation {
    match result {
        Ok(_) => Observation::Reachable,
        Err(RpcError::Unavailable(_)) | Err(RpcError::DeadlineExceeded(_)) => {
            Observation::Unreachable
        }
        Err(RpcError::Cancelled) => Observation::Unknown,
        Err(_) => Observation::Reachable,
    }
}
