use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    appresult::ErrorCode,
    auth::AuthContext,
    db,
    notify::{BroadcastNotifier, Notification, Notifier},
    AppError, AppResult,
};

use super::{ChatMessage, MessageKind};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub kind: MessageKind,
    pub file_url: Option<String>,
}

pub async fn send_message(
    db_pool: &SqlitePool,
    notifier: &dyn Notifier,
    ctx: &AuthContext,
    recipient_id: &str,
    NewMessage { content, kind, file_url }: NewMessage,
) -> AppResult<ChatMessage> {
    if recipient_id == ctx.profile_id {
        return Err(AppError::invalid(ErrorCode::InvalidTarget, "cannot message yourself"));
    }

    let (content, file_url) = match kind {
        MessageKind::Text => (db::non_empty("content", content)?, None),
        MessageKind::File => (
            content.map(|c| c.trim().to_owned()).unwrap_or_default(),
            Some(db::non_empty("file_url", file_url)?),
        ),
    };

    if sqlx::query_as::<_, (i64,)>("SELECT 1 FROM profiles WHERE id=?")
        .bind(recipient_id)
        .fetch_optional(db_pool)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("profile"));
    }

    let (participant1, participant2) = if ctx.profile_id.as_str() < recipient_id {
        (ctx.profile_id.as_str(), recipient_id)
    } else {
        (recipient_id, ctx.profile_id.as_str())
    };
    let now = db::now();

    let mut tx = db_pool.begin().await?;

    sqlx::query(
        "INSERT INTO chat_conversations (id,participant1,participant2,created_at,updated_at) VALUES (?,?,?,?,?) \
         ON CONFLICT(participant1,participant2) DO NOTHING",
    )
    .bind(db::new_id())
    .bind(participant1)
    .bind(participant2)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let (conversation_id,): (String,) =
        sqlx::query_as("SELECT id FROM chat_conversations WHERE participant1=? AND participant2=?")
            .bind(participant1)
            .bind(participant2)
            .fetch_one(&mut *tx)
            .await?;

    let message: ChatMessage = sqlx::query_as(
        "INSERT INTO chat_messages (id,conversation_id,sender_id,content,kind,file_url,created_at) \
         VALUES (?,?,?,?,?,?,?) RETURNING *",
    )
    .bind(db::new_id())
    .bind(&conversation_id)
    .bind(&ctx.profile_id)
    .bind(&content)
    .bind(kind)
    .bind(file_url)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE chat_conversations SET last_message_id=?, updated_at=? WHERE id=?")
        .bind(&message.id)
        .bind(&now)
        .bind(&conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    debug!(%conversation_id, sender_id = %ctx.profile_id, "message stored");
    notifier.notify(
        recipient_id,
        Notification::NewMessage { conversation_id, message: message.clone() },
    );

    Ok(message)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send(
    Path(recipient_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(notifier): State<BroadcastNotifier>,
    ctx: AuthContext,
    Json(new_message): Json<NewMessage>,
) -> AppResult<(StatusCode, Json<ChatMessage>)> {
    let message = send_message(&db_pool, &notifier, &ctx, &recipient_id, new_message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
