use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use haggler_core::domain::negotiation::NegotiationContext;
use haggler_core::domain::outcome::ThreadId;

use super::{EventCount, RepositoryError, ThreadRecord, ThreadRepository, ThreadStatus};
use crate::DbPool;

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn decode_record(row: &SqliteRow) -> Result<ThreadRecord, RepositoryError> {
        let context_json: String = row.try_get("context_json")?;
        let context: NegotiationContext = serde_json::from_str(&context_json)
            .map_err(|error| RepositoryError::Decode(format!("thread context: {error}")))?;

        let status_label: String = row.try_get("status")?;
        let status = match status_label.as_str() {
            "active" => ThreadStatus::Active,
            "closed" => ThreadStatus::Closed,
            other => {
                return Err(RepositoryError::Decode(format!("unknown thread status `{other}`")))
            }
        };

        Ok(ThreadRecord {
            thread_id: ThreadId(row.try_get("thread_id")?),
            context,
            status,
        })
    }
}

#[async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn upsert_thread(
        &self,
        thread_id: &ThreadId,
        context: &NegotiationContext,
    ) -> Result<(), RepositoryError> {
        let context_json = serde_json::to_string(context)
            .map_err(|error| RepositoryError::Decode(format!("thread context: {error}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO negotiation_threads (thread_id, context_json, status, created_at, updated_at) \
             VALUES (?, ?, 'active', ?, ?) \
             ON CONFLICT(thread_id) DO UPDATE SET \
                 context_json = excluded.context_json, \
                 status = 'active', \
                 updated_at = excluded.updated_at",
        )
        .bind(&thread_id.0)
        .bind(&context_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_thread(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Option<ThreadRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT thread_id, context_json, status FROM negotiation_threads WHERE thread_id = ?",
        )
        .bind(&thread_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode_record).transpose()
    }

    async fn close_thread(&self, thread_id: &ThreadId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE negotiation_threads SET status = 'closed', updated_at = ? WHERE thread_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&thread_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<ThreadRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT thread_id, context_json, status FROM negotiation_threads \
             WHERE status = 'active' ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_record).collect()
    }

    async fn log_event(
        &self,
        thread_id: Option<&ThreadId>,
        event_type: &str,
        detail: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO negotiation_events (thread_id, event_type, detail, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(thread_id.map(|id| id.0.as_str()))
        .bind(event_type)
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn event_funnel(&self) -> Result<Vec<EventCount>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_type, COUNT(*) AS count FROM negotiation_events \
             GROUP BY event_type ORDER BY count DESC, event_type",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EventCount {
                    event_type: row.try_get("event_type")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }
}
