use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::AuthContext,
    toggle::{self, ToggleOutcome, UpvoteTarget, VoteState},
    AppResult,
};

#[derive(Debug, Serialize)]
pub(crate) struct UpvoteResponse {
    upvotes: i64,
    upvoted: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    removed: bool,
}

impl From<ToggleOutcome> for UpvoteResponse {
    fn from(outcome: ToggleOutcome) -> Self {
        let upvoted = outcome.state == VoteState::Voted;
        Self { upvotes: outcome.upvotes, upvoted, removed: !upvoted }
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn upvote_post(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<UpvoteResponse>> {
    let outcome = toggle::toggle(&db_pool, &ctx.profile_id, UpvoteTarget::Post(&post_id)).await?;
    Ok(Json(outcome.into()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn upvote_comment(
    Path(comment_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<UpvoteResponse>> {
    let outcome = toggle::toggle(&db_pool, &ctx.profile_id, UpvoteTarget::Comment(&comment_id)).await?;
    Ok(Json(outcome.into()))
}
