//! Bearer authentication stage.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::TokenVerifier;
use crate::http::request::context_of;
use crate::http::response::ApiError;

pub async fn auth_required(
    State(verifier): State<TokenVerifier>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ctx = context_of(&request);
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let principal = match verifier.verify(&ctx, authorization.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!(request_id = %ctx.request_id(), error = %e, "Authentication failed");
            return ApiError::from(e).into_response();
        }
    };

    ctx.set_principal(principal.clone());
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}
