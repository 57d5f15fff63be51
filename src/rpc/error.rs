//! Downstream call errors.

use thiserror::Error;
use tonic::{Code, Status};

use crate::resilience::retries::Retryable;

/// Outcome of a failed downstream RPC, classified by gRPC status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal downstream error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Short label used in metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            RpcError::NotFound(_) => "not_found",
            RpcError::Unavailable(_) => "unavailable",
            RpcError::DeadlineExceeded(_) => "deadline_exceeded",
            RpcError::Cancelled => "cancelled",
            RpcError::InvalidArgument(_) => "invalid_argument",
            RpcError::Unauthenticated(_) => "unauthenticated",
            RpcError::PermissionDenied(_) => "permission_denied",
            RpcError::ResourceExhausted(_) => "resource_exhausted",
            RpcError::Internal(_) => "internal",
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => RpcError::NotFound(message),
            Code::Unavailable => RpcError::Unavailable(message),
            Code::DeadlineExceeded => RpcError::DeadlineExceeded(message),
            Code::Cancelled => RpcError::Cancelled,
            Code::InvalidArgument | Code::OutOfRange | Code::FailedPrecondition => {
                RpcError::InvalidArgument(message)
            }
            Code::Unauthenticated => RpcError::Unauthenticated(message),
            Code::PermissionDenied => RpcError::PermissionDenied(message),
            Code::ResourceExhausted => RpcError::ResourceExhausted(message),
            _ => RpcError::Internal(format!("{:?}: {}", status.code(), message)),
        }
    }
}

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::Unavailable(err.to_string())
    }
}

impl Retryable for RpcError {
    /// Only transport failures are retried; the request may not have reached the service.
    fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(
            RpcError::from(Status::not_found("user 7")),
            RpcError::NotFound("user 7".into())
        );
        assert_eq!(RpcError::from(Status::cancelled("")), RpcError::Cancelled);
        assert!(matches!(
            RpcError::from(Status::data_loss("disk")),
            RpcError::Internal(_)
        ));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(RpcError::Unavailable("reset".into()).is_retryable());
        assert!(!RpcError::DeadlineExceeded("late".into()).is_retryable());
        assert!(!RpcError::NotFound("x".into()).is_retryable());
    }
}
