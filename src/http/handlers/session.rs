//! Login and token refresh, forwarded to the Users service.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::http::request::{ApiJson, Ctx};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::rpc::proto::TokenReply;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshBody {
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<TokenReply>, ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let reply = state.users.login(&ctx, body.username, body.password).await?;
    Ok(Json(reply))
}

pub async fn refresh(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ApiJson(body): ApiJson<RefreshBody>,
) -> Result<Json<TokenReply>, ApiError> {
    if body.refresh_token.is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }
    let reply = state.users.refresh(&ctx, body.refresh_token).await?;
    Ok(Json(reply))
}
