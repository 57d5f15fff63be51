//! User lookups, single and batched.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::http::request::{ApiQuery, Ctx};
use crate::http::response::{ApiError, ErrorCode};
use crate::http::server::AppState;
use crate::rpc::proto::User;

/// Upper bound on ids in one batch request.
pub const MAX_BATCH: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserQuery {
    pub id: u64,
}

/// Public projection of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub username: String,
    pub avatar: u32,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            avatar: user.avatar,
        }
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<UserView>, ApiError> {
    let user = state.users.get_user(&ctx, query.id).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchQuery {
    pub ids: String,
}

#[derive(Debug, Serialize)]
struct ItemError {
    code: ErrorCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ItemResult {
    id: u64,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ItemError>,
}

#[derive(Debug, Serialize)]
struct BatchReply {
    results: Vec<ItemResult>,
}

/// Parse `1,2,3` into distinct ids, keeping first-seen order.
pub fn parse_ids(raw: &str) -> Result<Vec<u64>, ApiError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request(format!("invalid id '{}'", part)))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }
    if ids.len() > MAX_BATCH {
        return Err(ApiError::bad_request(format!(
            "at most {} ids per request",
            MAX_BATCH
        )));
    }
    Ok(ids)
}

/// `200` when every lookup succeeds, `207` with per-item results when some
/// fail, and the strictest error when all fail.
pub async fn get_users(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ApiQuery(query): ApiQuery<BatchQuery>,
) -> Result<Response, ApiError> {
    let ids = parse_ids(&query.ids)?;

    let lookups = ids.iter().map(|&id| {
        let users = state.users.clone();
        let ctx = &ctx;
        async move { (id, users.get_user(ctx, id).await.map_err(ApiError::from)) }
    });
    let outcomes = join_all(lookups).await;

    let failures = outcomes.iter().filter(|(_, r)| r.is_err()).count();
    if failures == outcomes.len() {
        let strictest = ApiError::strictest(outcomes.into_iter().filter_map(|(_, r)| r.err()));
        return Err(strictest.unwrap_or_else(ApiError::internal));
    }

    let status = if failures == 0 {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    let results = outcomes
        .into_iter()
        .map(|(id, outcome)| match outcome {
            Ok(user) => ItemResult {
                id,
                status: StatusCode::OK.as_u16(),
                user: Some(user.into()),
                error: None,
            },
            Err(err) => ItemResult {
                id,
                status: err.status().as_u16(),
                user: None,
                error: Some(ItemError {
                    code: err.code,
                    message: err.message,
                }),
            },
        })
        .collect();

    Ok((status, Json(BatchReply { results })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_parsed_and_deduplicated() {
        assert_eq!(parse_ids("3, 1,3,,2").unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn bad_ids_are_rejected() {
        assert_eq!(parse_ids("").unwrap_err().code, ErrorCode::BadRequest);
        assert_eq!(parse_ids("1,x").unwrap_err().code, ErrorCode::BadRequest);
        let many = (0..=MAX_BATCH as u64)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(parse_ids(&many).unwrap_err().code, ErrorCode::BadRequest);
    }
}
