use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::debug;

use super::local_path;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    return_url: Option<String>,
}

#[debug_handler]
pub(crate) async fn logout(Query(LogoutQuery { return_url }): Query<LogoutQuery>, session: Session) -> Redirect {
    if let Some(id) = session.id() {
        debug!(session_id = %id, "logging out");
    }
    session.clear().await;
    Redirect::to(&local_path(return_url).unwrap_or_else(|| "/login".to_owned()))
}
