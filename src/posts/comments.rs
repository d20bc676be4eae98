use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{appresult::ErrorCode, auth::AuthContext, db, AppError, AppResult};

use super::CommentView;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    pub body: Option<String>,
    pub parent_id: Option<String>,
}

pub async fn add_comment(
    db_pool: &SqlitePool,
    ctx: &AuthContext,
    post_id: &str,
    NewComment { body, parent_id }: NewComment,
) -> AppResult<CommentView> {
    let body = db::non_empty("body", body)?;

    if sqlx::query_as::<_, (i64,)>("SELECT 1 FROM posts WHERE id=?")
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("post"));
    }

    let parent_id = parent_id.filter(|id| !id.trim().is_empty());
    if let Some(parent_id) = &parent_id {
        let (parent_post,): (String,) = sqlx::query_as("SELECT post_id FROM comments WHERE id=?")
            .bind(parent_id)
            .fetch_optional(db_pool)
            .await?
            .ok_or(AppError::NotFound("comment"))?;
        if parent_post != post_id {
            return Err(AppError::invalid(ErrorCode::InvalidTarget, "reply must stay on the same post"));
        }
    }

    Ok(
        sqlx::query_as(
            "INSERT INTO comments (id,post_id,author_id,parent_id,body,created_at) VALUES (?,?,?,?,?,?) \
             RETURNING id,post_id,author_id,parent_id,body,created_at,0 AS upvotes",
        )
        .bind(db::new_id())
        .bind(post_id)
        .bind(&ctx.profile_id)
        .bind(parent_id)
        .bind(body)
        .bind(db::now())
        .fetch_one(db_pool)
        .await?,
    )
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn comment(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
    Json(new_comment): Json<NewComment>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let comment = add_comment(&db_pool, &ctx, &post_id, new_comment).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
