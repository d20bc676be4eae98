use std::sync::Arc;

use axum::{debug_handler, extract::{Multipart, State}, http::StatusCode, Json};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::{
    appresult::ErrorCode,
    auth::AuthContext,
    db,
    ledger::{self, Entry, Policy, TransactionKind},
    profiles,
    rewards::POST_COST,
    storage::{sanitize_file_name, ObjectStore},
    AppError, AppResult,
};

use super::{view, PostView};

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub categories: Vec<String>,
    pub attachments: Vec<Attachment>,
}

fn is_media(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type.starts_with("video/")
}

pub async fn create_post(
    db_pool: &SqlitePool,
    store: &dyn ObjectStore,
    ctx: &AuthContext,
    new_post: NewPost,
) -> AppResult<PostView> {
    let title = db::non_empty("title", new_post.title)?;
    let body = db::non_empty("body", new_post.body)?;
    if let Some(bad) = new_post.attachments.iter().find(|a| !is_media(&a.content_type)) {
        return Err(AppError::invalid(
            ErrorCode::UnsupportedMedia,
            format!("{} is not an image or video", bad.file_name),
        ));
    }

    // Early rejection so nothing is uploaded for a post that cannot be paid for.
    // The ledger debit below is the authoritative check.
    let profile = profiles::fetch(db_pool, &ctx.profile_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    if profile.credits < POST_COST {
        return Err(AppError::invalid(
            ErrorCode::InsufficientCredits,
            format!("posting costs {POST_COST} credits, {} available", profile.credits),
        ));
    }

    let post_id = db::new_id();
    let mut media = Vec::with_capacity(new_post.attachments.len());
    for (position, attachment) in new_post.attachments.into_iter().enumerate() {
        let key = format!("posts/{post_id}/{position}-{}", sanitize_file_name(&attachment.file_name));
        store.put(&key, attachment.bytes, &attachment.content_type).await?;
        media.push((store.public_url(&key), attachment.content_type));
    }

    let mut tx = db_pool.begin().await?;

    sqlx::query("INSERT INTO posts (id,author_id,title,body,created_at) VALUES (?,?,?,?,?)")
        .bind(&post_id)
        .bind(&ctx.profile_id)
        .bind(&title)
        .bind(&body)
        .bind(db::now())
        .execute(&mut *tx)
        .await?;

    let charged = ledger::apply_delta(
        &mut tx,
        Entry::new(&ctx.profile_id, -POST_COST, TransactionKind::PostCost)
            .policy(Policy::RequireFunds)
            .post(&post_id)
            .note(format!("posted \"{title}\"")),
    )
    .await?;

    link_categories(&mut tx, &post_id, &new_post.categories).await?;

    for (position, (url, content_type)) in media.iter().enumerate() {
        sqlx::query("INSERT INTO post_media (post_id,position,url,content_type) VALUES (?,?,?,?)")
            .bind(&post_id)
            .bind(position as i64)
            .bind(url)
            .bind(content_type)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(profile_id = %ctx.profile_id, %post_id, balance = charged.profile.credits, "post created");

    view::load(db_pool, &post_id).await?.ok_or(AppError::NotFound("post"))
}

async fn link_categories(conn: &mut SqliteConnection, post_id: &str, categories: &[String]) -> AppResult<()> {
    let mut names: Vec<String> = categories
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    names.sort();
    names.dedup();

    for name in names {
        sqlx::query("INSERT INTO categories (id,name) VALUES (?,?) ON CONFLICT(name) DO NOTHING")
            .bind(db::new_id())
            .bind(&name)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO post_categories (post_id,category_id) SELECT ?,id FROM categories WHERE name=?",
        )
        .bind(post_id)
        .bind(&name)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::invalid(ErrorCode::MissingField, err.body_text())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    State(store): State<Arc<dyn ObjectStore>>,
    ctx: AuthContext,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let mut new_post = NewPost::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name().unwrap_or_default() {
            "title" => new_post.title = Some(field.text().await.map_err(bad_multipart)?),
            "body" => new_post.body = Some(field.text().await.map_err(bad_multipart)?),
            "category" => new_post.categories.push(field.text().await.map_err(bad_multipart)?),
            "file" => {
                let file_name = field.file_name().unwrap_or("file").to_owned();
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_owned();
                let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
                new_post.attachments.push(Attachment { file_name, content_type, bytes });
            }
            _ => {}
        }
    }

    let post = create_post(&db_pool, store.as_ref(), &ctx, new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}
