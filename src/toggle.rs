use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::{
    appresult::is_unique_violation,
    db,
    ledger::{self, CreditTransaction, Entry, Policy, TransactionKind},
    rewards, AppError, AppResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvoteTarget<'a> {
    Post(&'a str),
    Comment(&'a str),
}

struct Statements {
    lookup: &'static str,
    delete: &'static str,
    insert: &'static str,
    count: &'static str,
}

const POST: Statements = Statements {
    lookup: "SELECT author_id,id FROM posts WHERE id=?",
    delete: "DELETE FROM post_upvotes WHERE post_id=? AND profile_id=?",
    insert: "INSERT INTO post_upvotes (post_id,profile_id,created_at) VALUES (?,?,?)",
    count: "SELECT COUNT(*) FROM post_upvotes WHERE post_id=?",
};

const COMMENT: Statements = Statements {
    lookup: "SELECT author_id,post_id FROM comments WHERE id=?",
    delete: "DELETE FROM comment_upvotes WHERE comment_id=? AND profile_id=?",
    insert: "INSERT INTO comment_upvotes (comment_id,profile_id,created_at) VALUES (?,?,?)",
    count: "SELECT COUNT(*) FROM comment_upvotes WHERE comment_id=?",
};

impl UpvoteTarget<'_> {
    fn id(&self) -> &str {
        match self {
            UpvoteTarget::Post(id) | UpvoteTarget::Comment(id) => id,
        }
    }

    fn statements(&self) -> &'static Statements {
        match self {
            UpvoteTarget::Post(_) => &POST,
            UpvoteTarget::Comment(_) => &COMMENT,
        }
    }

    fn missing(&self) -> AppError {
        match self {
            UpvoteTarget::Post(_) => AppError::NotFound("post"),
            UpvoteTarget::Comment(_) => AppError::NotFound("comment"),
        }
    }

    fn reward(&self, voter_id: &str, author_id: &str) -> i64 {
        match self {
            UpvoteTarget::Post(_) => 0,
            UpvoteTarget::Comment(_) => rewards::upvote_reward(voter_id, author_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    NotVoted,
    Voted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    pub state: VoteState,
    pub upvotes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<CreditTransaction>,
}

// The row is the state. The DELETE that opens the transaction decides the
// transition; a conflicting insert means another vote landed first and is
// withdrawn.
pub async fn toggle(db_pool: &SqlitePool, voter_id: &str, target: UpvoteTarget<'_>) -> AppResult<ToggleOutcome> {
    let statements = target.statements();

    let (author_id, post_id): (String, String) = sqlx::query_as(statements.lookup)
        .bind(target.id())
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| target.missing())?;

    let mut tx = db_pool.begin().await?;

    let state = if remove(&mut tx, statements, target.id(), voter_id).await? {
        VoteState::NotVoted
    } else {
        let inserted = sqlx::query(statements.insert)
            .bind(target.id())
            .bind(voter_id)
            .bind(db::now())
            .execute(&mut *tx)
            .await;
        match inserted {
            Ok(_) => VoteState::Voted,
            Err(err) if is_unique_violation(&err) => {
                debug!(target_id = target.id(), voter_id, "upvote already present, withdrawing");
                remove(&mut tx, statements, target.id(), voter_id).await?;
                VoteState::NotVoted
            }
            Err(err) => return Err(err.into()),
        }
    };

    let amount = target.reward(voter_id, &author_id);
    let reward = if amount > 0 {
        let entry = match state {
            VoteState::Voted => Entry::new(&author_id, amount, TransactionKind::UpvoteReward)
                .note(format!("upvote on comment {}", target.id())),
            VoteState::NotVoted => Entry::new(&author_id, -amount, TransactionKind::UpvoteReversal)
                .policy(Policy::FloorAtZero)
                .note(format!("upvote withdrawn on comment {}", target.id())),
        };
        let applied = ledger::apply_delta(&mut tx, entry.post(&post_id).comment(target.id())).await?;
        Some(applied.transaction)
    } else {
        None
    };

    let (upvotes,): (i64,) = sqlx::query_as(statements.count)
        .bind(target.id())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ToggleOutcome { state, upvotes, reward })
}

async fn remove(conn: &mut SqliteConnection, statements: &Statements, target_id: &str, voter_id: &str) -> AppResult<bool> {
    let removed = sqlx::query(statements.delete)
        .bind(target_id)
        .bind(voter_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(removed > 0)
}

pub async fn count(db_pool: &SqlitePool, target: UpvoteTarget<'_>) -> AppResult<i64> {
    let (upvotes,): (i64,) = sqlx::query_as(target.statements().count)
        .bind(target.id())
        .fetch_one(db_pool)
        .await?;
    Ok(upvotes)
}
