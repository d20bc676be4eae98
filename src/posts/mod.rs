mod comments;
mod create;
mod resolve;
mod upvote;
mod view;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use serde::Serialize;

use crate::AppState;

pub use comments::{add_comment, NewComment};
pub use create::{create_post, Attachment, NewPost};
pub use resolve::{mark_helpful, HelpfulMark};
pub use view::{delete_post, get_post, list_posts, ListQuery};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts",
            get(view::list).post(create::create).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/posts/{uuid}", get(view::detail).delete(view::delete))
        .route("/posts/{uuid}/comments", post(comments::comment))
        .route("/posts/{uuid}/resolve", post(resolve::resolve))
        .route("/posts/{uuid}/upvote", post(upvote::upvote_post))
        .route("/comments/{uuid}/upvote", post(upvote::upvote_comment))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Media {
    pub url: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub body_html: String,
    pub categories: Vec<String>,
    pub media: Vec<Media>,
    pub upvotes: i64,
    pub helpful_comment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub body: String,
    pub created_at: String,
    pub upvotes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub view: PostView,
    pub comments: Vec<CommentView>,
}
