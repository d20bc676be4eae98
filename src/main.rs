use std::sync::Arc;

use anyhow::Context;
use creditboard::{
    auth::Clients,
    config::Config,
    db,
    notify::BroadcastNotifier,
    payments::Razorpay,
    router,
    storage::LocalDiskStore,
    AppState,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "creditboard=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_minutes)));

    let db_pool = db::connect(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let clients = Clients::from_file(&config.oauth_clients_file, &config.public_url)?;

    tokio::fs::create_dir_all(&config.media_dir).await?;
    let store = LocalDiskStore::new(config.media_dir.clone(), &config.public_url);

    let app_state = AppState {
        db_pool,
        clients,
        store: Arc::new(store),
        gateway: Arc::new(Razorpay::new(&config.razorpay_key_id, &config.razorpay_key_secret)),
        notifier: BroadcastNotifier::new(256),
    };

    let app = router()
        .nest_service("/media", ServeDir::new(&config.media_dir))
        .with_state(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
