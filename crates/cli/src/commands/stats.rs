use serde::Serialize;

use haggler_core::config::{AppConfig, LoadOptions};
use haggler_db::repositories::NegotiationRepository;
use haggler_db::{
    connect, migrations, SavingsSummary, SqlNegotiationRepository, StrategyPerformance,
};

use super::{current_thread_runtime, CommandResult};

#[derive(Serialize)]
struct StatsReport {
    summary: SavingsSummary,
    strategies: Vec<StrategyPerformance>,
}

pub fn run(json: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "stats",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "stats",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repo = SqlNegotiationRepository::new(pool.clone());
        let summary = repo
            .savings_summary()
            .await
            .map_err(|error| ("ledger_read", error.to_string(), 6u8))?;
        let strategies = repo
            .strategy_performance()
            .await
            .map_err(|error| ("ledger_read", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(StatsReport { summary, strategies })
    });

    match result {
        Ok(report) => {
            if json {
                let output = serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
                CommandResult::plain(output)
            } else {
                CommandResult::plain(render_stats(&report))
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("stats", error_class, message, exit_code)
        }
    }
}

fn render_stats(report: &StatsReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "negotiations: {} ({} won)",
        report.summary.total_negotiations, report.summary.successes
    ));
    lines.push(format!(
        "savings: ${:.2}/month (${:.2}/year)",
        report.summary.total_monthly_savings, report.summary.total_annual_savings
    ));

    if !report.strategies.is_empty() {
        lines.push(String::new());
        lines.push("per-strategy:".to_string());
        for entry in &report.strategies {
            lines.push(format!(
                "  {:<10} {} attempts, {} won ({:.0}%), avg savings ${:.2}/month, \
                 ${:.2}/year total",
                entry.strategy,
                entry.attempts,
                entry.successes,
                entry.success_rate * 100.0,
                entry.average_savings,
                entry.total_annual_savings
            ));
        }
    }

    lines.join("\n")
}
