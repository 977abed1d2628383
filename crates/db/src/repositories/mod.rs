use async_trait::async_trait;
use thiserror::Error;

use haggler_core::domain::negotiation::NegotiationContext;
use haggler_core::domain::outcome::{NegotiationOutcome, ThreadId};

pub mod negotiation;
pub mod settings;
pub mod thread;

pub use negotiation::SqlNegotiationRepository;
pub use settings::SqlSettingsRepository;
pub use thread::SqlThreadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Aggregate figures across the whole ledger.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SavingsSummary {
    pub total_negotiations: i64,
    pub successes: i64,
    pub total_monthly_savings: f64,
    pub total_annual_savings: f64,
}

/// Win rate and savings figures for one strategy label.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub attempts: i64,
    pub successes: i64,
    pub success_rate: f64,
    pub average_savings: f64,
    pub total_annual_savings: f64,
}

/// How many events of each type the log has seen.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct EventCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Active,
    Closed,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// A persisted mail thread with the context it was opened for.
#[derive(Clone, Debug, PartialEq)]
pub struct ThreadRecord {
    pub thread_id: ThreadId,
    pub context: NegotiationContext,
    pub status: ThreadStatus,
}

/// Ledger of completed negotiations plus the stats derived from it.
#[async_trait]
pub trait NegotiationRepository: Send + Sync {
    async fn save_outcome(&self, outcome: &NegotiationOutcome) -> Result<i64, RepositoryError>;

    /// Most recent outcomes first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<NegotiationOutcome>, RepositoryError>;

    async fn outcomes_by_service(
        &self,
        service_type: &str,
    ) -> Result<Vec<NegotiationOutcome>, RepositoryError>;

    async fn savings_summary(&self) -> Result<SavingsSummary, RepositoryError>;

    async fn strategy_performance(&self) -> Result<Vec<StrategyPerformance>, RepositoryError>;
}

/// Mail-thread bookkeeping: which negotiations are still waiting on a
/// vendor reply, and the context needed to resume them.
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn upsert_thread(
        &self,
        thread_id: &ThreadId,
        context: &NegotiationContext,
    ) -> Result<(), RepositoryError>;

    async fn find_thread(&self, thread_id: &ThreadId)
        -> Result<Option<ThreadRecord>, RepositoryError>;

    async fn close_thread(&self, thread_id: &ThreadId) -> Result<(), RepositoryError>;

    async fn list_active(&self) -> Result<Vec<ThreadRecord>, RepositoryError>;

    async fn log_event(
        &self,
        thread_id: Option<&ThreadId>,
        event_type: &str,
        detail: &str,
    ) -> Result<(), RepositoryError>;

    /// Event counts grouped by type, most frequent first.
    async fn event_funnel(&self) -> Result<Vec<EventCount>, RepositoryError>;
}

/// Small key-value store for per-user preferences (default service type,
/// vendor addresses, and the like).
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn all(&self) -> Result<Vec<(String, String)>, RepositoryError>;
}
