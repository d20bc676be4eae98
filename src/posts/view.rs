use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    auth::AuthContext,
    markdown_to_html,
    toggle::{self, UpvoteTarget},
    AppError, AppResult,
};

use super::{CommentView, Media, Post, PostDetail, PostView};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub(crate) async fn load(db_pool: &SqlitePool, post_id: &str) -> AppResult<Option<PostView>> {
    let post: Option<Post> = sqlx::query_as("SELECT * FROM posts WHERE id=?")
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?;
    match post {
        Some(post) => Ok(Some(decorate(db_pool, post).await?)),
        None => Ok(None),
    }
}

async fn decorate(db_pool: &SqlitePool, post: Post) -> AppResult<PostView> {
    let categories: Vec<(String,)> = sqlx::query_as(
        "SELECT c.name FROM categories c JOIN post_categories pc ON pc.category_id=c.id \
         WHERE pc.post_id=? ORDER BY c.name",
    )
    .bind(&post.id)
    .fetch_all(db_pool)
    .await?;

    let media: Vec<Media> = sqlx::query_as("SELECT url,content_type FROM post_media WHERE post_id=? ORDER BY position")
        .bind(&post.id)
        .fetch_all(db_pool)
        .await?;

    let helpful: Option<(String,)> = sqlx::query_as("SELECT comment_id FROM helpful_marks WHERE post_id=?")
        .bind(&post.id)
        .fetch_optional(db_pool)
        .await?;

    Ok(PostView {
        body_html: markdown_to_html(&post.body),
        categories: categories.into_iter().map(|(name,)| name).collect(),
        media,
        upvotes: toggle::count(db_pool, UpvoteTarget::Post(&post.id)).await?,
        helpful_comment_id: helpful.map(|(id,)| id),
        post,
    })
}

pub async fn list_posts(db_pool: &SqlitePool, query: ListQuery) -> AppResult<Vec<PostView>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let category = query
        .category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    let posts: Vec<Post> = sqlx::query_as(
        "SELECT p.* FROM posts p \
         WHERE ?1 IS NULL OR EXISTS ( \
             SELECT 1 FROM post_categories pc JOIN categories c ON c.id=pc.category_id \
             WHERE pc.post_id=p.id AND c.name=?1) \
         ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?2 OFFSET ?3",
    )
    .bind(category)
    .bind(limit)
    .bind(offset)
    .fetch_all(db_pool)
    .await?;

    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        views.push(decorate(db_pool, post).await?);
    }
    Ok(views)
}

pub async fn get_post(db_pool: &SqlitePool, post_id: &str) -> AppResult<PostDetail> {
    let view = load(db_pool, post_id).await?.ok_or(AppError::NotFound("post"))?;

    let comments: Vec<CommentView> = sqlx::query_as(
        "SELECT c.id,c.post_id,c.author_id,c.parent_id,c.body,c.created_at, \
             (SELECT COUNT(*) FROM comment_upvotes u WHERE u.comment_id=c.id) AS upvotes \
         FROM comments c WHERE c.post_id=? ORDER BY c.created_at, c.rowid",
    )
    .bind(post_id)
    .fetch_all(db_pool)
    .await?;

    Ok(PostDetail { view, comments })
}

pub async fn delete_post(db_pool: &SqlitePool, ctx: &AuthContext, post_id: &str) -> AppResult<()> {
    let (author_id,): (String,) = sqlx::query_as("SELECT author_id FROM posts WHERE id=?")
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("post"))?;

    if author_id != ctx.profile_id {
        return Err(AppError::Forbidden("only the author can delete this post".into()));
    }

    sqlx::query("DELETE FROM posts WHERE id=? AND author_id=?")
        .bind(post_id)
        .bind(&ctx.profile_id)
        .execute(db_pool)
        .await?;

    info!(profile_id = %ctx.profile_id, %post_id, "post deleted");
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    list_posts(&db_pool, query).await.map(Json)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn detail(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<PostDetail>> {
    get_post(&db_pool, &post_id).await.map(Json)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<StatusCode> {
    delete_post(&db_pool, &ctx, &post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{appresult::ErrorCode, auth, db, ledger, posts::{create_post, NewPost}, storage::LocalDiskStore};

    async fn post(db_pool: &SqlitePool, ctx: &AuthContext, title: &str, category: &str) -> String {
        let store = LocalDiskStore::new(std::env::temp_dir().join("creditboard-unused"), "http://x");
        create_post(
            db_pool,
            &store,
            ctx,
            NewPost {
                title: Some(title.into()),
                body: Some("body".into()),
                categories: vec![category.into()],
                attachments: Vec::new(),
            },
        )
        .await
        .unwrap()
        .post
        .id
    }

    #[tokio::test]
    async fn lists_newest_first_with_category_filter() {
        let db_pool = db::memory_pool().await.unwrap();
        let ctx = auth::resolve_identity(&db_pool, "a", "a@x.io", None).await.unwrap();

        post(&db_pool, &ctx, "first", "sql").await;
        post(&db_pool, &ctx, "second", "rust").await;

        let all = list_posts(&db_pool, ListQuery::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.post.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);

        let sql = list_posts(&db_pool, ListQuery { category: Some("SQL".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].post.title, "first");
    }

    #[tokio::test]
    async fn only_the_author_deletes_and_the_ledger_survives() {
        let db_pool = db::memory_pool().await.unwrap();
        let author = auth::resolve_identity(&db_pool, "a", "a@x.io", None).await.unwrap();
        let stranger = auth::resolve_identity(&db_pool, "s", "s@x.io", None).await.unwrap();
        let post_id = post(&db_pool, &author, "mine", "misc").await;

        let err = delete_post(&db_pool, &stranger, &post_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        delete_post(&db_pool, &author, &post_id).await.unwrap();
        assert!(matches!(get_post(&db_pool, &post_id).await, Err(AppError::NotFound("post"))));
        assert!(matches!(delete_post(&db_pool, &author, &post_id).await, Err(AppError::NotFound("post"))));

        let history = ledger::history(&db_pool, &author.profile_id).await.unwrap();
        assert!(history.iter().any(|t| t.post_id.as_deref() == Some(post_id.as_str())));
        assert!(ledger::audit(&db_pool, &author.profile_id).await.unwrap().is_consistent());
    }
}
