use axum::{debug_handler, extract::{Path, State}, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    auth::AuthContext,
    db,
    notify::{BroadcastNotifier, Notification, Notifier},
    profiles, AppError, AppResult,
};

use super::{ChatMessage, Conversation, InboxEntry};

pub async fn inbox(db_pool: &SqlitePool, ctx: &AuthContext) -> AppResult<Vec<InboxEntry>> {
    let conversations: Vec<Conversation> = sqlx::query_as(
        "SELECT * FROM chat_conversations WHERE participant1=?1 OR participant2=?1 ORDER BY updated_at DESC",
    )
    .bind(&ctx.profile_id)
    .fetch_all(db_pool)
    .await?;

    let mut entries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let Some(other) = profiles::fetch(db_pool, conversation.other(&ctx.profile_id)).await? else {
            continue;
        };

        let last_message: Option<ChatMessage> = match &conversation.last_message_id {
            Some(id) => sqlx::query_as("SELECT * FROM chat_messages WHERE id=?")
                .bind(id)
                .fetch_optional(db_pool)
                .await?,
            None => None,
        };

        let (unread,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_messages WHERE conversation_id=? AND sender_id<>? AND is_read=0",
        )
        .bind(&conversation.id)
        .bind(&ctx.profile_id)
        .fetch_one(db_pool)
        .await?;

        entries.push(InboxEntry { conversation, other: other.into(), last_message, unread });
    }
    Ok(entries)
}

async fn participant_conversation(db_pool: &SqlitePool, ctx: &AuthContext, conversation_id: &str) -> AppResult<Conversation> {
    sqlx::query_as("SELECT * FROM chat_conversations WHERE id=?1 AND (participant1=?2 OR participant2=?2)")
        .bind(conversation_id)
        .bind(&ctx.profile_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("conversation"))
}

pub async fn messages(db_pool: &SqlitePool, ctx: &AuthContext, conversation_id: &str) -> AppResult<Vec<ChatMessage>> {
    let conversation = participant_conversation(db_pool, ctx, conversation_id).await?;

    Ok(
        sqlx::query_as("SELECT * FROM chat_messages WHERE conversation_id=? ORDER BY created_at, rowid")
            .bind(&conversation.id)
            .fetch_all(db_pool)
            .await?,
    )
}

pub async fn mark_read(
    db_pool: &SqlitePool,
    notifier: &dyn Notifier,
    ctx: &AuthContext,
    conversation_id: &str,
) -> AppResult<u64> {
    let conversation = participant_conversation(db_pool, ctx, conversation_id).await?;

    let updated = sqlx::query(
        "UPDATE chat_messages SET is_read=1, read_at=? WHERE conversation_id=? AND sender_id<>? AND is_read=0",
    )
    .bind(db::now())
    .bind(&conversation.id)
    .bind(&ctx.profile_id)
    .execute(db_pool)
    .await?
    .rows_affected();

    if updated > 0 {
        notifier.notify(
            conversation.other(&ctx.profile_id),
            Notification::MessagesRead {
                conversation_id: conversation.id.clone(),
                reader_id: ctx.profile_id.clone(),
                count: updated,
            },
        );
    }
    Ok(updated)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<Vec<InboxEntry>>> {
    inbox(&db_pool, &ctx).await.map(Json)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    Path(conversation_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<Vec<ChatMessage>>> {
    messages(&db_pool, &ctx, &conversation_id).await.map(Json)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn read(
    Path(conversation_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(notifier): State<BroadcastNotifier>,
    ctx: AuthContext,
) -> AppResult<Json<Value>> {
    let updated = mark_read(&db_pool, &notifier, &ctx, &conversation_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
