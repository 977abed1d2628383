use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply pending migrations and report the number of versions now
/// recorded in the migrations table.
pub async fn run_pending(pool: &DbPool) -> Result<u64, MigrateError> {
    MIGRATOR.run(pool).await?;
    let applied: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM _sqlx_migrations").fetch_one(pool).await?;
    Ok(applied.0 as u64)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connection::{connect, memory_config};
    use crate::migrations::MIGRATOR;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "negotiations",
        "negotiation_threads",
        "negotiation_events",
        "user_settings",
        "idx_negotiations_date",
        "idx_negotiations_service_type",
        "idx_negotiations_strategy",
        "idx_negotiation_threads_status",
        "idx_negotiation_events_thread_id",
        "idx_negotiation_events_event_type",
    ];

    #[tokio::test]
    async fn migrations_create_the_ledger_tables() {
        let pool = connect(&memory_config()).await.expect("connect");
        let applied = run_pending(&pool).await.expect("run migrations");
        assert_eq!(applied, 1);

        for table in ["negotiations", "negotiation_threads", "negotiation_events", "user_settings"]
        {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "table {table} should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect(&memory_config()).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let remaining = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master
             WHERE type IN ('table', 'index')
               AND (name LIKE 'negotiation%' OR name = 'user_settings')",
        )
        .fetch_one(&pool)
        .await
        .expect("check schema")
        .get::<i64, _>("count");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect(&memory_config()).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial = managed_schema_signature(&pool).await;
        assert_eq!(initial.len(), MANAGED_SCHEMA_OBJECTS.len());

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(managed_schema_signature(&pool).await.is_empty());

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(managed_schema_signature(&pool).await, initial);
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
