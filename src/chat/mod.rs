mod inbox;
mod msg;
mod ws;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};

use crate::{profiles::PublicProfile, AppState};

pub use inbox::{inbox, mark_read, messages};
pub use msg::{send_message, NewMessage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/conversations", get(inbox::list))
        .route("/chat/conversations/{uuid}/messages", get(inbox::history))
        .route("/chat/conversations/{uuid}/read", post(inbox::read))
        .route("/chat/with/{uuid}/messages", post(msg::send))
        .route("/chat/ws", get(ws::chat_ws))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub participant1: String,
    pub participant2: String,
    pub last_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn other(&self, profile_id: &str) -> &str {
        if self.participant1 == profile_id { &self.participant2 } else { &self.participant1 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub conversation: Conversation,
    pub other: PublicProfile,
    pub last_message: Option<ChatMessage>,
    pub unread: i64,
}
