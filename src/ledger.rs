use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::{
    appresult::ErrorCode,
    db,
    profiles::{self, Profile},
    AppError, AppResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    WelcomeBonus,
    Purchase,
    PostCost,
    HelpfulReward,
    UpvoteReward,
    UpvoteReversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Credit,
    RequireFunds,
    FloorAtZero,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CreditTransaction {
    pub id: String,
    pub profile_id: String,
    pub delta: i64,
    pub balance_after: i64,
    pub kind: TransactionKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub note: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub profile_id: &'a str,
    pub delta: i64,
    pub kind: TransactionKind,
    pub policy: Policy,
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub note: String,
}

impl<'a> Entry<'a> {
    pub fn new(profile_id: &'a str, delta: i64, kind: TransactionKind) -> Self {
        Self {
            profile_id,
            delta,
            kind,
            policy: Policy::Credit,
            post_id: None,
            comment_id: None,
            note: String::new(),
        }
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn post(mut self, post_id: &'a str) -> Self {
        self.post_id = Some(post_id);
        self
    }

    pub fn comment(mut self, comment_id: &'a str) -> Self {
        self.comment_id = Some(comment_id);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub profile: Profile,
    pub transaction: CreditTransaction,
}

// The only writer of `profiles.credits`. Opening with a no-op UPDATE takes the
// SQLite write lock before the balance is read, so concurrent callers queue on
// the busy timeout instead of failing a read-to-write upgrade. The balance
// write is still a compare-and-set on the value read.
pub async fn apply_delta(conn: &mut SqliteConnection, entry: Entry<'_>) -> AppResult<Applied> {
    let Some((current,)): Option<(i64,)> =
        sqlx::query_as("UPDATE profiles SET credits=credits WHERE id=? RETURNING credits")
            .bind(entry.profile_id)
            .fetch_optional(&mut *conn)
            .await?
    else {
        return Err(AppError::NotFound("profile"));
    };

    let target = current
        .checked_add(entry.delta)
        .ok_or_else(|| anyhow!("credit balance overflow on profile {}", entry.profile_id))?;

    let new_balance = match entry.policy {
        Policy::Credit => target,
        Policy::RequireFunds if target < 0 => {
            return Err(AppError::invalid(
                ErrorCode::InsufficientCredits,
                format!("insufficient credits: {} needed, {current} available", -entry.delta),
            ));
        }
        Policy::RequireFunds => target,
        Policy::FloorAtZero => target.max(0),
    };
    let applied = new_balance - current;

    let updated = sqlx::query("UPDATE profiles SET credits=? WHERE id=? AND credits=?")
        .bind(new_balance)
        .bind(entry.profile_id)
        .bind(current)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if updated != 1 {
        return Err(anyhow!("balance of profile {} changed underneath the ledger", entry.profile_id).into());
    }

    let note = if applied != entry.delta {
        format!("{} (requested {}, floored at 0)", entry.note, entry.delta)
    } else {
        entry.note
    };

    let transaction: CreditTransaction = sqlx::query_as(
        "INSERT INTO credit_transactions (id,profile_id,delta,balance_after,kind,post_id,comment_id,note,created_at) \
         VALUES (?,?,?,?,?,?,?,?,?) RETURNING *",
    )
    .bind(db::new_id())
    .bind(entry.profile_id)
    .bind(applied)
    .bind(new_balance)
    .bind(entry.kind)
    .bind(entry.post_id)
    .bind(entry.comment_id)
    .bind(note)
    .bind(db::now())
    .fetch_one(&mut *conn)
    .await?;

    let profile = profiles::fetch(&mut *conn, entry.profile_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    info!(
        profile_id = %entry.profile_id,
        delta = applied,
        balance = new_balance,
        kind = ?entry.kind,
        "ledger entry applied"
    );

    Ok(Applied { profile, transaction })
}

pub async fn history(db_pool: &SqlitePool, profile_id: &str) -> AppResult<Vec<CreditTransaction>> {
    Ok(
        sqlx::query_as("SELECT * FROM credit_transactions WHERE profile_id=? ORDER BY rowid DESC")
            .bind(profile_id)
            .fetch_all(db_pool)
            .await?,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Audit {
    pub credits: i64,
    pub ledger_sum: i64,
    pub snapshots_consistent: bool,
}

impl Audit {
    pub fn is_consistent(&self) -> bool {
        self.credits == self.ledger_sum && self.snapshots_consistent
    }
}

pub async fn audit(db_pool: &SqlitePool, profile_id: &str) -> AppResult<Audit> {
    let (credits,): (i64,) = sqlx::query_as("SELECT credits FROM profiles WHERE id=?")
        .bind(profile_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT delta,balance_after FROM credit_transactions WHERE profile_id=? ORDER BY rowid",
    )
    .bind(profile_id)
    .fetch_all(db_pool)
    .await?;

    let mut ledger_sum = 0;
    let mut snapshots_consistent = true;
    for (delta, balance_after) in rows {
        ledger_sum += delta;
        snapshots_consistent &= ledger_sum == balance_after;
    }

    Ok(Audit { credits, ledger_sum, snapshots_consistent })
}
