use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub public_url: String,
    pub oauth_clients_file: PathBuf,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub media_dir: PathBuf,
    pub session_minutes: i64,
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn required(key: &str) -> anyhow::Result<String> {
    dotenv::var(key).with_context(|| format!("{key} must be set"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://creditboard.db"),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", "16")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            public_url: var_or("PUBLIC_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_owned(),
            oauth_clients_file: var_or("OAUTH_CLIENTS_FILE", "client_secret.json").into(),
            razorpay_key_id: required("RAZORPAY_KEY_ID")?,
            razorpay_key_secret: required("RAZORPAY_KEY_SECRET")?,
            media_dir: var_or("MEDIA_DIR", "media").into(),
            session_minutes: var_or("SESSION_MINUTES", "60")
                .parse()
                .context("SESSION_MINUTES must be an integer")?,
        })
    }
}
