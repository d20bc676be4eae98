mod page;

use axum::{routing::get, Router};
use serde::Serialize;
use sqlx::{types::Json, SqliteExecutor};

use crate::{AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(page::me).patch(page::update_me).delete(page::delete_me))
        .route("/profiles/{uuid}", get(page::profile))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub interests: Json<Vec<String>>,
    pub expertise: Json<Vec<String>>,
    pub credits: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub interests: Vec<String>,
    pub expertise: Vec<String>,
}

impl From<Profile> for PublicProfile {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            handle: profile.handle,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            bio: profile.bio,
            interests: profile.interests.0,
            expertise: profile.expertise.0,
        }
    }
}

pub async fn fetch<'e>(executor: impl SqliteExecutor<'e>, profile_id: &str) -> AppResult<Option<Profile>> {
    Ok(
        sqlx::query_as("SELECT * FROM profiles WHERE id=?")
            .bind(profile_id)
            .fetch_optional(executor)
            .await?,
    )
}
