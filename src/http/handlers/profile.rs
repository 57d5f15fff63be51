//! Profile page: the user and their recent posts, fetched concurrently.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::handlers::users::UserView;
use crate::http::request::{ApiQuery, Ctx};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::rpc::proto::Post;

const DEFAULT_POSTS: u32 = 20;
const MAX_POSTS: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileQuery {
    pub id: u64,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub user: UserView,
    pub posts: Vec<Post>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ApiQuery(query): ApiQuery<ProfileQuery>,
) -> Result<Json<ProfileView>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_POSTS).clamp(1, MAX_POSTS);

    // Siblings share the deadline; the first failure drops the other call
    // and fires the group's token.
    let group = ctx.child();
    let joined = tokio::try_join!(
        state.users.get_user(&group, query.id),
        state.posts.list_by_author(&group, query.id, limit),
    );

    match joined {
        Ok((user, posts)) => Ok(Json(ProfileView {
            user: user.into(),
            posts,
        })),
        Err(err) => {
            group.cancel();
            Err(err.into())
        }
    }
}
