//! Request extractors.
//!
//! # Responsibilities
//! - Parse bodies and query strings strictly, rejecting in the gateway's error format
//! - Hand the per-request context to handlers
//!
//! # Design Decisions
//! - Body size rejections surface as 413, every other parse failure as 400
//! - Handlers never see a request without a context

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::context::{KeySet, RequestContext};
use crate::http::response::ApiError;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_TRACE_ID: &str = "x-trace-id";

/// JSON body extractor with gateway-format rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            crate::http::response::ErrorCode::PayloadTooLarge,
            "request body too large",
        );
    }
    ApiError::bad_request(rejection.body_text())
}

/// Query string extractor with gateway-format rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection: QueryRejection| ApiError::bad_request(rejection.body_text()))
    }
}

/// The request context installed by the ingress layer.
#[derive(Debug, Clone)]
pub struct Ctx(pub RequestContext);

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<RequestContext>() {
            Some(ctx) => Ok(Ctx(ctx.clone())),
            None => {
                tracing::error!("Request reached a handler without a context");
                Err(ApiError::internal())
            }
        }
    }
}

/// Context of `req`, or a fresh ingress context if none was installed.
pub fn context_of<B>(req: &axum::http::Request<B>) -> RequestContext {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::ingress(KeySet::common()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::DefaultBodyLimit;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    #[allow(dead_code)]
    struct Login {
        username: String,
    }

    async fn handler(ApiJson(_body): ApiJson<Login>) -> impl IntoResponse {
        StatusCode::OK
    }

    fn app() -> Router {
        Router::new()
            .route("/", post(handler))
            .layer(DefaultBodyLimit::max(32))
    }

    fn json(body: &'static str) -> axum::http::Request<Body> {
        axum::http::Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_fields_are_bad_request() {
        let response = app()
            .oneshot(json(r#"{"username":"a","admin":true}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        let response = app()
            .oneshot(json(r#"{"username":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn valid_body_passes() {
        let response = app().oneshot(json(r#"{"username":"a"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
