//! SQLite persistence for the negotiation ledger.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, DbPool};
pub use repositories::{
    EventCount, NegotiationRepository, RepositoryError, SavingsSummary, SettingsRepository,
    SqlNegotiationRepository, SqlSettingsRepository, SqlThreadRepository, StrategyPerformance,
    ThreadRecord, ThreadRepository, ThreadStatus,
};
