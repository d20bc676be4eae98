use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::AuthContext,
    ledger::{self, CreditTransaction},
    profiles, AppError, AppResult,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistory {
    pub transactions: Vec<CreditTransaction>,
    pub current_balance: i64,
}

pub async fn credit_history(db_pool: &SqlitePool, ctx: &AuthContext) -> AppResult<CreditHistory> {
    let profile = profiles::fetch(db_pool, &ctx.profile_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    Ok(CreditHistory {
        transactions: ledger::history(db_pool, &profile.id).await?,
        current_balance: profile.credits,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
) -> AppResult<Json<CreditHistory>> {
    credit_history(&db_pool, &ctx).await.map(Json)
}
