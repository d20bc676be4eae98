use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use creditboard::{
    auth::{self, Clients},
    db,
    notify::BroadcastNotifier,
    payments::Razorpay,
    posts::{add_comment, NewComment},
    rewards::{UPVOTE_REWARD, WELCOME_BONUS},
    router,
    session::USER_ID,
    storage::LocalDiskStore,
    AppResult, AppState,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

async fn test_login(
    Path(external_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<String> {
    let ctx = auth::resolve_identity(&db_pool, &external_id, &format!("{external_id}@test.io"), None).await?;
    session.insert(USER_ID, &external_id).await?;
    Ok(ctx.profile_id)
}

struct TestApp {
    app: Router,
    db_pool: SqlitePool,
}

impl TestApp {
    async fn new() -> Self {
        let db_pool = db::memory_pool().await.unwrap();
        let media = std::env::temp_dir().join(format!("creditboard-api-{}", uuid::Uuid::now_v7()));
        let state = AppState {
            db_pool: db_pool.clone(),
            clients: Clients::default(),
            store: Arc::new(LocalDiskStore::new(media, "http://localhost")),
            gateway: Arc::new(Razorpay::new("rzp_test", "secret")),
            notifier: BroadcastNotifier::new(16),
        };
        let app = router()
            .route("/test-login/{external_id}", get(test_login))
            .with_state(state)
            .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false));
        Self { app, db_pool }
    }

    /// Returns the session cookie and profile id.
    async fn login(&self, external_id: &str) -> (String, String) {
        let response = self
            .app
            .clone()
            .oneshot(Request::get(format!("/test-login/{external_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned();
        let profile_id = String::from_utf8(response.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();
        (cookie, profile_id)
    }

    async fn call(&self, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }
}

#[tokio::test]
async fn anonymous_callers_get_structured_401() {
    let app = TestApp::new().await;
    let (status, body) = app.call("GET", "/credits/history", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn new_profile_sees_welcome_bonus() {
    let app = TestApp::new().await;
    let (cookie, _) = app.login("alice").await;

    let (status, body) = app.call("GET", "/credits/history", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentBalance"], WELCOME_BONUS);
    assert_eq!(body["transactions"][0]["kind"], "WELCOME_BONUS");

    let (_, packages) = app.call("GET", "/credits/packages", None, None).await;
    assert_eq!(packages.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn comment_upvote_toggles_over_http() {
    let app = TestApp::new().await;
    let (_, author) = app.login("author").await;
    let (voter_cookie, _) = app.login("voter").await;

    let post_id = db::new_id();
    sqlx::query("INSERT INTO posts (id,author_id,title,body,created_at) VALUES (?,?,'q','b',?)")
        .bind(&post_id)
        .bind(&author)
        .bind(db::now())
        .execute(&app.db_pool)
        .await
        .unwrap();
    let author_ctx = auth::resolve_identity(&app.db_pool, "author", "author@test.io", None).await.unwrap();
    let comment = add_comment(
        &app.db_pool,
        &author_ctx,
        &post_id,
        NewComment { body: Some("answer".into()), parent_id: None },
    )
    .await
    .unwrap();

    let uri = format!("/comments/{}/upvote", comment.id);
    let (status, body) = app.call("POST", &uri, Some(&voter_cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "upvotes": 1, "upvoted": true }));

    let (author_credits,): (i64,) = sqlx::query_as("SELECT credits FROM profiles WHERE id=?")
        .bind(&author)
        .fetch_one(&app.db_pool)
        .await
        .unwrap();
    assert_eq!(author_credits, WELCOME_BONUS + UPVOTE_REWARD);

    let (_, body) = app.call("POST", &uri, Some(&voter_cookie), None).await;
    assert_eq!(body, json!({ "upvotes": 0, "upvoted": false, "removed": true }));

    let (status, body) = app.call("POST", "/comments/missing/upvote", Some(&voter_cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn forged_payment_is_rejected() {
    let app = TestApp::new().await;
    let (cookie, _) = app.login("buyer").await;

    let confirmation = json!({
        "razorpay_order_id": "order_1",
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": "deadbeef",
        "packageType": "starter",
    });
    let (status, body) = app.call("POST", "/credits/verify", Some(&cookie), Some(confirmation)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");

    let (_, history) = app.call("GET", "/credits/history", Some(&cookie), None).await;
    assert_eq!(history["currentBalance"], WELCOME_BONUS);
}

#[tokio::test]
async fn direct_messages_reach_the_inbox() {
    let app = TestApp::new().await;
    let (alice, _) = app.login("alice").await;
    let (bob, bob_id) = app.login("bob").await;

    let (status, message) = app
        .call("POST", &format!("/chat/with/{bob_id}/messages"), Some(&alice), Some(json!({ "content": "hi bob" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["kind"], "text");

    let (_, inbox) = app.call("GET", "/chat/conversations", Some(&bob), None).await;
    assert_eq!(inbox[0]["unread"], 1);
    assert_eq!(inbox[0]["last_message"]["content"], "hi bob");

    let conversation_id = message["conversation_id"].as_str().unwrap();
    let (_, read) = app
        .call("POST", &format!("/chat/conversations/{conversation_id}/read"), Some(&bob), None)
        .await;
    assert_eq!(read["updated"], 1);
}
