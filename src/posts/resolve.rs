use axum::{debug_handler, extract::{Path, State}, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    appresult::{is_unique_violation, ErrorCode},
    auth::AuthContext,
    db,
    ledger::{self, Entry, Policy, TransactionKind},
    rewards::HELPFUL_REWARD,
    AppError, AppResult,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HelpfulMark {
    pub post_id: String,
    pub comment_id: String,
    pub marked_by: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveRequest {
    #[serde(alias = "commentId")]
    comment_id: Option<String>,
}

fn already_resolved() -> AppError {
    AppError::invalid(ErrorCode::AlreadyResolved, "post already has a helpful answer")
}

pub async fn mark_helpful(
    db_pool: &SqlitePool,
    ctx: &AuthContext,
    post_id: &str,
    comment_id: Option<String>,
) -> AppResult<HelpfulMark> {
    let comment_id = db::non_empty("commentId", comment_id)?;

    let (post_author,): (String,) = sqlx::query_as("SELECT author_id FROM posts WHERE id=?")
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("post"))?;
    if post_author != ctx.profile_id {
        return Err(AppError::Forbidden("only the post author can mark an answer helpful".into()));
    }

    if sqlx::query_as::<_, (i64,)>("SELECT 1 FROM helpful_marks WHERE post_id=?")
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?
        .is_some()
    {
        return Err(already_resolved());
    }

    let (comment_author,): (String,) = sqlx::query_as("SELECT author_id FROM comments WHERE id=? AND post_id=?")
        .bind(&comment_id)
        .bind(post_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("comment"))?;
    if comment_author == post_author {
        return Err(AppError::invalid(ErrorCode::InvalidTarget, "cannot mark your own comment helpful"));
    }

    let mut tx = db_pool.begin().await?;

    let inserted = sqlx::query_as(
        "INSERT INTO helpful_marks (post_id,comment_id,marked_by,created_at) VALUES (?,?,?,?) RETURNING *",
    )
    .bind(post_id)
    .bind(&comment_id)
    .bind(&ctx.profile_id)
    .bind(db::now())
    .fetch_one(&mut *tx)
    .await;
    let mark: HelpfulMark = match inserted {
        Ok(mark) => mark,
        Err(err) if is_unique_violation(&err) => return Err(already_resolved()),
        Err(err) => return Err(err.into()),
    };

    ledger::apply_delta(
        &mut tx,
        Entry::new(&post_author, -HELPFUL_REWARD, TransactionKind::HelpfulReward)
            .policy(Policy::RequireFunds)
            .post(post_id)
            .comment(&comment_id)
            .note("helpful answer reward paid"),
    )
    .await?;
    ledger::apply_delta(
        &mut tx,
        Entry::new(&comment_author, HELPFUL_REWARD, TransactionKind::HelpfulReward)
            .post(post_id)
            .comment(&comment_id)
            .note("helpful answer reward earned"),
    )
    .await?;

    tx.commit().await?;

    info!(%post_id, %comment_id, from = %post_author, to = %comment_author, "post resolved");
    Ok(mark)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn resolve(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    ctx: AuthContext,
    Json(ResolveRequest { comment_id }): Json<ResolveRequest>,
) -> AppResult<Json<HelpfulMark>> {
    mark_helpful(&db_pool, &ctx, &post_id, comment_id).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth,
        ledger::CreditTransaction,
        posts::{add_comment, create_post, NewComment, NewPost},
        rewards::{POST_COST, WELCOME_BONUS},
        storage::LocalDiskStore,
    };

    struct Thread {
        db_pool: SqlitePool,
        asker: AuthContext,
        answerer: AuthContext,
        post_id: String,
        answer_id: String,
        own_id: String,
    }

    async fn thread() -> Thread {
        let db_pool = db::memory_pool().await.unwrap();
        let asker = auth::resolve_identity(&db_pool, "asker", "a@x.io", None).await.unwrap();
        let answerer = auth::resolve_identity(&db_pool, "answerer", "b@x.io", None).await.unwrap();

        // Top the asker up so the reward is affordable after paying for the post.
        let mut tx = db_pool.begin().await.unwrap();
        ledger::apply_delta(&mut tx, Entry::new(&asker.profile_id, 20, TransactionKind::Purchase))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let store = LocalDiskStore::new(std::env::temp_dir().join("creditboard-unused"), "http://x");
        let post_id = create_post(
            &db_pool,
            &store,
            &asker,
            NewPost { title: Some("q".into()), body: Some("?".into()), ..Default::default() },
        )
        .await
        .unwrap()
        .post
        .id;

        let answer_id = add_comment(&db_pool, &answerer, &post_id, NewComment { body: Some("a".into()), parent_id: None })
            .await
            .unwrap()
            .id;
        let own_id = add_comment(&db_pool, &asker, &post_id, NewComment { body: Some("bump".into()), parent_id: None })
            .await
            .unwrap()
            .id;

        Thread { db_pool, asker, answerer, post_id, answer_id, own_id }
    }

    fn rewards_for(history: &[CreditTransaction]) -> Vec<&CreditTransaction> {
        history.iter().filter(|t| t.kind == TransactionKind::HelpfulReward).collect()
    }

    #[tokio::test]
    async fn transfers_the_reward_once() {
        let t = thread().await;
        let asker_before = WELCOME_BONUS + 20 - POST_COST;

        let mark = mark_helpful(&t.db_pool, &t.asker, &t.post_id, Some(t.answer_id.clone())).await.unwrap();
        assert_eq!(mark.comment_id, t.answer_id);

        let asker = ledger::audit(&t.db_pool, &t.asker.profile_id).await.unwrap();
        let answerer = ledger::audit(&t.db_pool, &t.answerer.profile_id).await.unwrap();
        assert_eq!(asker.credits, asker_before - HELPFUL_REWARD);
        assert_eq!(answerer.credits, WELCOME_BONUS + HELPFUL_REWARD);
        assert!(asker.is_consistent() && answerer.is_consistent());

        let paid = ledger::history(&t.db_pool, &t.asker.profile_id).await.unwrap();
        let earned = ledger::history(&t.db_pool, &t.answerer.profile_id).await.unwrap();
        for leg in rewards_for(&paid).into_iter().chain(rewards_for(&earned)) {
            assert_eq!(leg.post_id.as_deref(), Some(t.post_id.as_str()));
            assert_eq!(leg.comment_id.as_deref(), Some(t.answer_id.as_str()));
        }
        assert_eq!(rewards_for(&paid).len() + rewards_for(&earned).len(), 2);

        let again = mark_helpful(&t.db_pool, &t.asker, &t.post_id, Some(t.answer_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(again.code(), ErrorCode::AlreadyResolved);
        assert_eq!(ledger::audit(&t.db_pool, &t.asker.profile_id).await.unwrap().credits, asker_before - HELPFUL_REWARD);
    }

    #[tokio::test]
    async fn preconditions_reject_before_writing() {
        let t = thread().await;

        let err = mark_helpful(&t.db_pool, &t.answerer, &t.post_id, Some(t.answer_id.clone())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = mark_helpful(&t.db_pool, &t.asker, &t.post_id, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingField);

        let err = mark_helpful(&t.db_pool, &t.asker, &t.post_id, Some(t.own_id.clone())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTarget);

        let err = mark_helpful(&t.db_pool, &t.asker, &t.post_id, Some("missing".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("comment")));

        let err = mark_helpful(&t.db_pool, &t.asker, "missing", Some(t.answer_id.clone())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("post")));

        let (marks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM helpful_marks").fetch_one(&t.db_pool).await.unwrap();
        assert_eq!(marks, 0);
        assert!(rewards_for(&ledger::history(&t.db_pool, &t.answerer.profile_id).await.unwrap()).is_empty());
    }

    #[tokio::test]
    async fn unaffordable_reward_rolls_back_the_mark() {
        let t = thread().await;
        let balance = ledger::audit(&t.db_pool, &t.asker.profile_id).await.unwrap().credits;
        let mut tx = t.db_pool.begin().await.unwrap();
        ledger::apply_delta(
            &mut tx,
            Entry::new(&t.asker.profile_id, -(balance - 1), TransactionKind::PostCost).policy(Policy::RequireFunds),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let err = mark_helpful(&t.db_pool, &t.asker, &t.post_id, Some(t.answer_id.clone())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientCredits);

        let (marks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM helpful_marks").fetch_one(&t.db_pool).await.unwrap();
        assert_eq!(marks, 0);
        assert_eq!(ledger::audit(&t.db_pool, &t.answerer.profile_id).await.unwrap().credits, WELCOME_BONUS);
    }
}
