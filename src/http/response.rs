//! Client-facing error responses.
//!
//! # Responsibilities
//! - Define the fixed error vocabulary of the HTTP surface
//! - Map subsystem errors onto it
//! - Render `{"error":{"code","message"}}` bodies
//!
//! # Design Decisions
//! - Messages are client-safe; internal detail is logged, never returned
//! - A total strictness order decides which failure a fan-out reports

use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::auth::AuthError;
use crate::cache::CacheError;
use crate::rpc::RpcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    RateLimited,
    UpstreamUnavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::UpstreamUnavailable => "upstream_unavailable",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Higher is stricter.
    pub fn strictness(&self) -> u8 {
        match self {
            ErrorCode::Internal => 10,
            ErrorCode::DeadlineExceeded => 9,
            ErrorCode::UpstreamUnavailable => 8,
            ErrorCode::Forbidden => 7,
            ErrorCode::Unauthenticated => 6,
            ErrorCode::RateLimited => 5,
            ErrorCode::NotFound => 4,
            ErrorCode::BadRequest => 3,
            ErrorCode::PayloadTooLarge => 2,
            ErrorCode::MethodNotAllowed => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned to HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    retry_after: Option<u64>,
    allow: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
            allow: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// 405 with an `Allow` header listing `allowed`.
    pub fn method_not_allowed(allowed: &[axum::http::Method]) -> Self {
        let allow = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            allow: Some(allow),
            ..Self::new(ErrorCode::MethodNotAllowed, "method not allowed")
        }
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("request body exceeds {} bytes", limit),
        )
    }

    /// 429 with `Retry-After` in whole seconds (at least 1).
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after: Some(retry_after_secs.max(1)),
            ..Self::new(ErrorCode::RateLimited, "rate limit exceeded")
        }
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorCode::DeadlineExceeded, "request deadline exceeded")
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal, "internal error")
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// The strictest of `errors`, if any.
    pub fn strictest<I>(errors: I) -> Option<ApiError>
    where
        I: IntoIterator<Item = ApiError>,
    {
        errors.into_iter().max_by_key(|e| e.code.strictness())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        let mut response = (self.code.status(), Json(body)).into_response();

        let headers = response.headers_mut();
        if let Some(secs) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(allow) = self.allow.as_deref() {
            if let Ok(value) = HeaderValue::from_str(allow) {
                headers.insert(header::ALLOW, value);
            }
        }
        response.extensions_mut().insert(self.code);
        response
    }
}

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::NotFound(message) if !message.is_empty() => ApiError::not_found(message),
            RpcError::NotFound(_) => ApiError::not_found("resource not found"),
            RpcError::Unavailable(detail) => {
                tracing::warn!(error = %detail, "Downstream unavailable");
                ApiError::upstream_unavailable("upstream service unavailable")
            }
            RpcError::DeadlineExceeded(_) | RpcError::Cancelled => ApiError::deadline_exceeded(),
            RpcError::InvalidArgument(message) => ApiError::bad_request(message),
            RpcError::Unauthenticated(_) => ApiError::unauthenticated("invalid credentials"),
            RpcError::PermissionDenied(_) => ApiError::forbidden("permission denied"),
            RpcError::ResourceExhausted(_) => ApiError::rate_limited(1),
            RpcError::Internal(detail) => {
                tracing::error!(error = %detail, "Downstream internal error");
                ApiError::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_forbidden() {
            ApiError::forbidden(err.to_string())
        } else {
            ApiError::unauthenticated(err.to_string())
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound => ApiError::not_found("resource not found"),
            CacheError::Transport(detail) => {
                tracing::warn!(error = %detail, "Cache unavailable");
                ApiError::upstream_unavailable("cache unavailable")
            }
            other => {
                tracing::error!(error = %other, "Cache invariant violated");
                ApiError::internal()
            }
        }
    }
}
