use haggler_core::config::{AppConfig, LoadOptions};
use haggler_core::domain::outcome::NegotiationOutcome;
use haggler_db::repositories::NegotiationRepository;
use haggler_db::{connect, migrations, SqlNegotiationRepository};

use super::{current_thread_runtime, CommandResult};

#[derive(Debug, clap::Args)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 10, help = "Maximum number of outcomes to show")]
    pub limit: u32,
    #[arg(long, help = "Only show outcomes for this service type")]
    pub service: Option<String>,
    #[arg(long, help = "Emit machine-readable JSON output")]
    pub json: bool,
}

pub fn run(args: HistoryArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "history",
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
                "history",
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
        let outcomes = match &args.service {
            Some(service) => repo
                .outcomes_by_service(service)
                .await
                .map_err(|error| ("ledger_read", error.to_string(), 6u8))?
                .into_iter()
                .take(args.limit as usize)
                .collect(),
            None => repo
                .list_recent(args.limit)
                .await
                .map_err(|error| ("ledger_read", error.to_string(), 6u8))?,
        };
        pool.close().await;
        Ok::<Vec<NegotiationOutcome>, (&'static str, String, u8)>(outcomes)
    });

    match result {
        Ok(outcomes) => {
            if args.json {
                let output = serde_json::to_string_pretty(&outcomes)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
                CommandResult::plain(output)
            } else {
                CommandResult::plain(render_history(&outcomes))
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("history", error_class, message, exit_code)
        }
    }
}

fn render_history(outcomes: &[NegotiationOutcome]) -> String {
    if outcomes.is_empty() {
        return "no negotiations recorded yet".to_string();
    }

    let mut lines = Vec::new();
    for outcome in outcomes {
        lines.push(format!(
            "{}  {}  {}  ${:.2} -> ${:.2}  {}",
            outcome.date.format("%Y-%m-%d"),
            outcome.service_type,
            outcome.strategy,
            outcome.original_price,
            outcome.final_price,
            if outcome.success { "won" } else { "lost" }
        ));
    }
    lines.join("\n")
}
