use axum::{extract::{FromRef, FromRequestParts}, http::request::Parts, routing::get, Router};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{
    db,
    ledger::{self, Entry, TransactionKind},
    rewards::WELCOME_BONUS,
    session::USER_ID,
    AppError, AppResult, AppState,
};

mod clients;
mod login;
mod lockin;
mod logout;

pub use clients::{ClientProvider, Clients};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::providers))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub profile_id: String,
}

impl<S> FromRequestParts<S> for AuthContext
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthenticated)?;
        let Some(external_id) = session.get::<String>(USER_ID).await? else {
            return Err(AppError::Unauthenticated);
        };

        lookup(&SqlitePool::from_ref(state), &external_id)
            .await?
            .ok_or(AppError::Unauthenticated)
    }
}

async fn lookup(db_pool: &SqlitePool, external_id: &str) -> AppResult<Option<AuthContext>> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT u.id,p.id FROM users u JOIN profiles p ON p.user_id=u.id WHERE u.external_id=?",
    )
    .bind(external_id)
    .fetch_optional(db_pool)
    .await?;

    Ok(row.map(|(user_id, profile_id)| AuthContext { user_id, profile_id }))
}

pub(crate) fn local_path(url: Option<String>) -> Option<String> {
    url.filter(|url| url.starts_with('/') && !url.starts_with("//"))
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Curious", "Patient", "Jolly", "Brave", "Quiet", "Witty", "Keen",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sharp",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Wise", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Otter", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Heron", "Turtle", "Dolphin", "Whale", "Badger", "Lynx", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).copied().unwrap_or("Nameless"),
        nouns.choose(&mut rng).copied().unwrap_or("Member"),
    )
}

pub async fn resolve_identity(
    db_pool: &SqlitePool,
    external_id: &str,
    email: &str,
    display_name: Option<&str>,
) -> AppResult<AuthContext> {
    if let Some(ctx) = lookup(db_pool, external_id).await? {
        return Ok(ctx);
    }

    let user_id = db::new_id();
    let profile_id = db::new_id();
    let mut tx = db_pool.begin().await?;

    let created = sqlx::query(
        "INSERT INTO users (id,external_id,email,created_at) VALUES (?,?,?,?) \
         ON CONFLICT(external_id) DO NOTHING",
    )
    .bind(&user_id)
    .bind(external_id)
    .bind(email)
    .bind(db::now())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if created == 0 {
        // Lost a race with a concurrent first login.
        drop(tx);
        return lookup(db_pool, external_id)
            .await?
            .ok_or(AppError::Unauthenticated);
    }

    let handle = "user".to_owned() + &profile_id.replace('-', "");
    let display_name = display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(random_alias);

    sqlx::query("INSERT INTO profiles (id,user_id,handle,display_name,credits,created_at) VALUES (?,?,?,?,0,?)")
        .bind(&profile_id)
        .bind(&user_id)
        .bind(&handle)
        .bind(&display_name)
        .bind(db::now())
        .execute(&mut *tx)
        .await?;

    ledger::apply_delta(
        &mut tx,
        Entry::new(&profile_id, WELCOME_BONUS, TransactionKind::WelcomeBonus).note("welcome bonus"),
    )
    .await?;

    tx.commit().await?;

    info!(%user_id, %profile_id, %handle, %display_name, "new member");
    Ok(AuthContext { user_id, profile_id })
}
