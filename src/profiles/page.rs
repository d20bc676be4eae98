use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{auth::AuthContext, AppError, AppResult};

use super::{fetch, Profile, PublicProfile};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProfileUpdate {
    display_name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    interests: Option<Vec<String>>,
    expertise: Option<Vec<String>>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<Profile>> {
    fetch(&db_pool, &ctx.profile_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("profile"))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_me(
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    update_profile(&db_pool, &ctx.profile_id, update).await.map(Json)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_me(
    State(db_pool): State<SqlitePool>,
    session: Session,
    ctx: AuthContext,
) -> AppResult<StatusCode> {
    sqlx::query("DELETE FROM users WHERE id=?")
        .bind(&ctx.user_id)
        .execute(&db_pool)
        .await?;
    session.clear().await;

    info!(user_id = %ctx.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    Path(profile_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    _ctx: AuthContext,
) -> AppResult<Json<PublicProfile>> {
    fetch(&db_pool, &profile_id)
        .await?
        .map(|profile| Json(profile.into()))
        .ok_or(AppError::NotFound("profile"))
}

pub(crate) async fn update_profile(db_pool: &SqlitePool, profile_id: &str, update: ProfileUpdate) -> AppResult<Profile> {
    let clean = |value: Option<String>| value.map(|v| v.trim().to_owned());
    let display_name = clean(update.display_name).filter(|v| !v.is_empty());
    let tidy = |tags: Option<Vec<String>>| {
        tags.map(|tags| {
            tags.into_iter()
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
    };

    sqlx::query(
        "UPDATE profiles SET \
            display_name=COALESCE(?,display_name), \
            avatar_url=CASE WHEN ? THEN NULLIF(?, '') ELSE avatar_url END, \
            bio=CASE WHEN ? THEN NULLIF(?, '') ELSE bio END, \
            interests=COALESCE(?,interests), \
            expertise=COALESCE(?,expertise) \
         WHERE id=?",
    )
    .bind(display_name)
    .bind(update.avatar_url.is_some())
    .bind(clean(update.avatar_url))
    .bind(update.bio.is_some())
    .bind(clean(update.bio))
    .bind(tidy(update.interests).map(sqlx::types::Json))
    .bind(tidy(update.expertise).map(sqlx::types::Json))
    .bind(profile_id)
    .execute(db_pool)
    .await?;

    fetch(db_pool, profile_id).await?.ok_or(AppError::NotFound("profile"))
}
