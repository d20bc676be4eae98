use std::{str::FromStr, time::Duration};

use chrono::{SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use crate::res;

// WAL plus a busy timeout: writers queue on the write lock.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&db_pool).await?;
    Ok(db_pool)
}

#[cfg(test)]
pub(crate) async fn file_pool(max_connections: u32) -> SqlitePool {
    let path = std::env::temp_dir().join(format!("creditboard-{}.db", new_id()));
    connect(&format!("sqlite://{}", path.display()), max_connections)
        .await
        .unwrap()
}

pub async fn init_schema(db_pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(res::SCHEMA).execute(db_pool).await?;
    Ok(())
}

pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn non_empty(field: &'static str, value: Option<String>) -> crate::AppResult<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(crate::AppError::missing(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let db_pool = memory_pool().await.unwrap();
        init_schema(&db_pool).await.unwrap();

        let (tables,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table'")
                .fetch_one(&db_pool)
                .await
                .unwrap();
        assert_eq!(tables, 14);
    }

    #[tokio::test]
    async fn file_pool_runs_in_wal() {
        let db_pool = file_pool(4).await;
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn blank_is_missing() {
        assert!(non_empty("title", Some("   ".into())).is_err());
        assert!(non_empty("title", None).is_err());
        assert_eq!(non_empty("title", Some(" hi ".into())).unwrap(), "hi");
    }
}
