use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    appresult::{is_unique_violation, ErrorCode},
    auth::AuthContext,
    db,
    ledger::{self, Entry, TransactionKind},
    payments::PaymentGateway,
    rewards, AppError, AppResult,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfirmation {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    #[serde(alias = "packageType")]
    pub package_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub credits_added: i64,
    pub new_balance: i64,
    pub transaction_id: String,
}

fn already_processed(payment_id: &str) -> AppError {
    AppError::invalid(ErrorCode::AlreadyProcessed, format!("payment {payment_id} was already processed"))
}

pub async fn verify_payment(
    db_pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    ctx: &AuthContext,
    confirmation: PaymentConfirmation,
) -> AppResult<Settlement> {
    let order_id = db::non_empty("razorpay_order_id", confirmation.razorpay_order_id)?;
    let payment_id = db::non_empty("razorpay_payment_id", confirmation.razorpay_payment_id)?;
    let signature = db::non_empty("razorpay_signature", confirmation.razorpay_signature)?;
    let package_type = db::non_empty("packageType", confirmation.package_type)?;

    if !gateway.verify_signature(&order_id, &payment_id, &signature) {
        warn!(profile_id = %ctx.profile_id, %order_id, %payment_id, "payment signature mismatch");
        return Err(AppError::invalid(ErrorCode::InvalidSignature, "payment signature verification failed"));
    }

    let package = rewards::package(&package_type)?;

    let recorded: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM credit_transactions WHERE profile_id=? AND kind=? AND instr(note, ?) > 0 LIMIT 1",
    )
    .bind(&ctx.profile_id)
    .bind(TransactionKind::Purchase)
    .bind(format!("payment {payment_id};"))
    .fetch_optional(db_pool)
    .await?;
    if recorded.is_some() {
        return Err(already_processed(&payment_id));
    }

    let mut tx = db_pool.begin().await?;

    let claimed = sqlx::query(
        "INSERT INTO payments (payment_id,order_id,profile_id,package,credits,created_at) VALUES (?,?,?,?,?,?)",
    )
    .bind(&payment_id)
    .bind(&order_id)
    .bind(&ctx.profile_id)
    .bind(package.id)
    .bind(package.credits)
    .bind(db::now())
    .execute(&mut *tx)
    .await;
    match claimed {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(already_processed(&payment_id)),
        Err(err) => return Err(err.into()),
    }

    let applied = ledger::apply_delta(
        &mut tx,
        Entry::new(&ctx.profile_id, package.credits, TransactionKind::Purchase)
            .note(format!("razorpay order {order_id}; payment {payment_id}; package {}", package.id)),
    )
    .await?;

    sqlx::query("UPDATE payments SET transaction_id=? WHERE payment_id=?")
        .bind(&applied.transaction.id)
        .bind(&payment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(profile_id = %ctx.profile_id, %payment_id, credits = package.credits, "payment settled");

    Ok(Settlement {
        credits_added: package.credits,
        new_balance: applied.profile.credits,
        transaction_id: applied.transaction.id,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn verify(
    State(db_pool): State<SqlitePool>,
    State(gateway): State<Arc<dyn PaymentGateway>>,
    ctx: AuthContext,
    Json(confirmation): Json<PaymentConfirmation>,
) -> AppResult<Json<Settlement>> {
    verify_payment(&db_pool, gateway.as_ref(), &ctx, confirmation).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, payments::{sign, Razorpay}, rewards::WELCOME_BONUS};

    const SECRET: &str = "test_secret";

    fn confirmation(order_id: &str, payment_id: &str, package: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            razorpay_order_id: Some(order_id.into()),
            razorpay_payment_id: Some(payment_id.into()),
            razorpay_signature: Some(sign(SECRET, order_id, payment_id)),
            package_type: Some(package.into()),
        }
    }

    async fn setup() -> (SqlitePool, Razorpay, AuthContext) {
        let db_pool = db::memory_pool().await.unwrap();
        let ctx = auth::resolve_identity(&db_pool, "buyer", "b@x.io", None).await.unwrap();
        (db_pool, Razorpay::new("rzp_test", SECRET), ctx)
    }

    #[tokio::test]
    async fn settles_once() {
        let (db_pool, gateway, ctx) = setup().await;

        let settled = verify_payment(&db_pool, &gateway, &ctx, confirmation("order_1", "pay_1", "starter"))
            .await
            .unwrap();
        assert_eq!(settled.credits_added, 50);
        assert_eq!(settled.new_balance, WELCOME_BONUS + 50);

        let again = verify_payment(&db_pool, &gateway, &ctx, confirmation("order_1", "pay_1", "starter"))
            .await
            .unwrap_err();
        assert_eq!(again.code(), ErrorCode::AlreadyProcessed);

        let audit = ledger::audit(&db_pool, &ctx.profile_id).await.unwrap();
        assert_eq!(audit.credits, WELCOME_BONUS + 50);
        assert!(audit.is_consistent());
    }

    #[tokio::test]
    async fn payment_ids_that_share_a_prefix_are_distinct() {
        let (db_pool, gateway, ctx) = setup().await;

        verify_payment(&db_pool, &gateway, &ctx, confirmation("o1", "pay_12", "starter")).await.unwrap();
        verify_payment(&db_pool, &gateway, &ctx, confirmation("o2", "pay_1", "starter")).await.unwrap();

        assert_eq!(ledger::audit(&db_pool, &ctx.profile_id).await.unwrap().credits, WELCOME_BONUS + 100);
    }

    #[tokio::test]
    async fn same_payment_cannot_settle_for_two_profiles() {
        let (db_pool, gateway, ctx) = setup().await;
        let other = auth::resolve_identity(&db_pool, "other", "o@x.io", None).await.unwrap();

        verify_payment(&db_pool, &gateway, &ctx, confirmation("o", "pay_9", "pro")).await.unwrap();
        let err = verify_payment(&db_pool, &gateway, &other, confirmation("o", "pay_9", "pro"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyProcessed);
        assert_eq!(ledger::audit(&db_pool, &other.profile_id).await.unwrap().credits, WELCOME_BONUS);
    }

    #[tokio::test]
    async fn rejections_write_nothing() {
        let (db_pool, gateway, ctx) = setup().await;

        let mut forged = confirmation("o", "p", "starter");
        forged.razorpay_signature = Some(sign("wrong", "o", "p"));
        let err = verify_payment(&db_pool, &gateway, &ctx, forged).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSignature);

        let err = verify_payment(&db_pool, &gateway, &ctx, confirmation("o", "p", "platinum"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPackage);

        let mut blank = confirmation("o", "p", "starter");
        blank.razorpay_payment_id = Some(" ".into());
        let err = verify_payment(&db_pool, &gateway, &ctx, blank).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingField);

        assert_eq!(ledger::history(&db_pool, &ctx.profile_id).await.unwrap().len(), 1);
        let (payments,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(payments, 0);
    }
}
