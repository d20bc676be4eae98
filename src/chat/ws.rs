use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::{auth::AuthContext, notify::BroadcastNotifier};

use super::msg::{self, NewMessage};

#[derive(Deserialize)]
struct Outgoing {
    to: String,
    #[serde(flatten)]
    message: NewMessage,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(db_pool): State<SqlitePool>,
    State(notifier): State<BroadcastNotifier>,
    ctx: AuthContext,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve(stream, db_pool, notifier, ctx))
}

async fn serve(stream: WebSocket, db_pool: SqlitePool, notifier: BroadcastNotifier, ctx: AuthContext) {
    let mut subscription = notifier.subscribe(&ctx.profile_id);
    let (mut sender, mut receiver) = stream.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(notification) = subscription.recv().await {
            let Ok(text) = serde_json::to_string(&notification) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            if matches!(frame, Message::Close(_)) {
                break;
            }
            let Ok(Outgoing { to, message }) = serde_json::from_slice(&frame.into_data()) else {
                continue;
            };
            if let Err(err) = msg::send_message(&db_pool, &notifier, &ctx, &to, message).await {
                warn!(profile_id = %ctx.profile_id, error = %err, "websocket message rejected");
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => forward_task.abort(),
    };
    debug!("chat socket closed");
}
