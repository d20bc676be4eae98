pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod credits;
pub mod db;
pub mod ledger;
pub mod notify;
pub mod payments;
pub mod posts;
pub mod profiles;
pub mod res;
pub mod rewards;
pub mod session;
pub mod storage;
pub mod toggle;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

use notify::BroadcastNotifier;
use payments::PaymentGateway;
use storage::ObjectStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub store: Arc<dyn ObjectStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: BroadcastNotifier,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(profiles::router())
        .merge(posts::router())
        .merge(credits::router())
        .merge(chat::router())
}

pub fn markdown_to_html(source: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser};

    let parser = Parser::new_ext(source, Options::ENABLE_MATH | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            _ => event,
        });

    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_escapes_raw_html() {
        let html = markdown_to_html("**bold** <script>alert(1)</script>");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
