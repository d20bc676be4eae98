use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::chat::ChatMessage;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewMessage { conversation_id: String, message: ChatMessage },
    MessagesRead { conversation_id: String, reader_id: String, count: u64 },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, target_profile_id: &str, notification: Notification);
}

#[derive(Debug, Clone)]
struct Addressed {
    target: String,
    notification: Notification,
}

#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Addressed>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self { tx: broadcast::channel(capacity).0 }
    }

    pub fn subscribe(&self, profile_id: &str) -> Subscription {
        Subscription { profile_id: profile_id.to_owned(), rx: self.tx.subscribe() }
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, target_profile_id: &str, notification: Notification) {
        let addressed = Addressed { target: target_profile_id.to_owned(), notification };
        if self.tx.send(addressed).is_err() {
            debug!(target_profile_id, "no live listeners, notification dropped");
        }
    }
}

pub struct Subscription {
    profile_id: String,
    rx: broadcast::Receiver<Addressed>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(addressed) if addressed.target == self.profile_id => return Some(addressed.notification),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(profile_id = %self.profile_id, skipped, "notification listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
