use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use haggler_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open the ledger pool described by `config`. Every connection gets the
/// same session pragmas: foreign keys on (the event log references
/// threads), WAL journaling, and a busy timeout so concurrent writers
/// back off instead of failing.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}

#[cfg(test)]
pub(crate) fn memory_config() -> DatabaseConfig {
    DatabaseConfig { url: "sqlite::memory:".to_string(), max_connections: 1, timeout_secs: 30 }
}
