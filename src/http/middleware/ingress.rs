//! Root ingress layer: builds the request context before any route middleware.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::context::KeySet;
use crate::http::request::X_TRACE_ID;
use crate::rpc::metadata::headers_to_context;

pub async fn ingress(State(keys): State<KeySet>, mut request: Request, next: Next) -> Response {
    let ctx = headers_to_context(request.headers(), &keys);
    let trace_id = HeaderValue::from_str(ctx.trace_id()).ok();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Some(trace_id) = trace_id {
        response.headers_mut().insert(X_TRACE_ID, trace_id);
    }
    response
}
