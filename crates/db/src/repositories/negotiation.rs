use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use haggler_core::domain::negotiation::Strategy;
use haggler_core::domain::outcome::NegotiationOutcome;

use super::{NegotiationRepository, RepositoryError, SavingsSummary, StrategyPerformance};
use crate::DbPool;

pub struct SqlNegotiationRepository {
    pool: DbPool,
}

impl SqlNegotiationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn decode_outcome(row: &SqliteRow) -> Result<NegotiationOutcome, RepositoryError> {
        let date: DateTime<Utc> = row.try_get("date")?;
        let strategy_label: String = row.try_get("strategy")?;
        let strategy = Strategy::from_str(&strategy_label).map_err(RepositoryError::Decode)?;

        Ok(NegotiationOutcome {
            date,
            service_type: row.try_get("service_type")?,
            vendor_message: row.try_get("vendor_message")?,
            original_price: row.try_get("original_price")?,
            target_price: row.try_get("target_price")?,
            final_price: row.try_get("final_price")?,
            strategy,
            proposal_content: row.try_get("proposal_content")?,
            vendor_response: row.try_get("vendor_response")?,
            success: row.try_get("success")?,
        })
    }
}

const OUTCOME_COLUMNS: &str = "date, service_type, vendor_message, original_price, target_price, \
                               final_price, strategy, proposal_content, vendor_response, success";

#[async_trait]
impl NegotiationRepository for SqlNegotiationRepository {
    async fn save_outcome(&self, outcome: &NegotiationOutcome) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO negotiations (date, service_type, vendor_message, original_price, \
             target_price, final_price, strategy, proposal_content, vendor_response, success) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(outcome.date)
        .bind(&outcome.service_type)
        .bind(&outcome.vendor_message)
        .bind(outcome.original_price)
        .bind(outcome.target_price)
        .bind(outcome.final_price)
        .bind(outcome.strategy.as_str())
        .bind(&outcome.proposal_content)
        .bind(&outcome.vendor_response)
        .bind(outcome.success)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<NegotiationOutcome>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTCOME_COLUMNS} FROM negotiations ORDER BY date DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_outcome).collect()
    }

    async fn outcomes_by_service(
        &self,
        service_type: &str,
    ) -> Result<Vec<NegotiationOutcome>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTCOME_COLUMNS} FROM negotiations \
             WHERE service_type = ? ORDER BY date DESC, id DESC"
        ))
        .bind(service_type)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_outcome).collect()
    }

    async fn savings_summary(&self) -> Result<SavingsSummary, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    IFNULL(SUM(success), 0) AS successes, \
                    IFNULL(SUM(CASE WHEN success THEN original_price - final_price ELSE 0.0 END), 0.0) \
                        AS monthly_savings \
             FROM negotiations",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_monthly_savings: f64 = row.try_get("monthly_savings")?;
        Ok(SavingsSummary {
            total_negotiations: row.try_get("total")?,
            successes: row.try_get("successes")?,
            total_monthly_savings,
            total_annual_savings: total_monthly_savings * 12.0,
        })
    }

    async fn strategy_performance(&self) -> Result<Vec<StrategyPerformance>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT strategy, \
                    COUNT(*) AS attempts, \
                    IFNULL(SUM(success), 0) AS successes, \
                    IFNULL(AVG(CASE WHEN success THEN original_price - final_price END), 0.0) \
                        AS average_savings, \
                    IFNULL(SUM(CASE WHEN success THEN original_price - final_price ELSE 0.0 END), 0.0) \
                        AS monthly_savings \
             FROM negotiations \
             GROUP BY strategy \
             ORDER BY strategy",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let attempts: i64 = row.try_get("attempts")?;
                let successes: i64 = row.try_get("successes")?;
                let monthly_savings: f64 = row.try_get("monthly_savings")?;
                Ok(StrategyPerformance {
                    strategy: row.try_get("strategy")?,
                    attempts,
                    successes,
                    success_rate: if attempts > 0 {
                        successes as f64 / attempts as f64
                    } else {
                        0.0
                    },
                    average_savings: row.try_get("average_savings")?,
                    total_annual_savings: monthly_savings * 12.0,
                })
            })
            .collect()
    }
}
