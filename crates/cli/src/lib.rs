pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use haggler_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "haggler",
    about = "Vendor price negotiation assistant",
    long_about = "Generate negotiation proposals, simulate vendor replies, and track \
                  savings across renewals.",
    after_help = "Examples:\n  haggler propose --vendor-message \"Renewal at $1000/mo\" \
                  --past-price 1000 --target-price 800\n  haggler stats\n  haggler doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Generate one counter-offer proposal per strategy")]
    Propose(commands::propose::ProposeArgs),
    #[command(about = "Run a full round: proposals, a simulated vendor reply, and optionally \
                       record the outcome")]
    Simulate(commands::simulate::SimulateArgs),
    #[command(about = "List recent negotiation outcomes from the ledger")]
    History(commands::history::HistoryArgs),
    #[command(about = "Show total savings and per-strategy performance")]
    Stats {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, engine readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
}

pub fn run() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Propose(args) => commands::propose::run(args),
        Command::Simulate(args) => commands::simulate::run(args),
        Command::History(args) => commands::history::run(args),
        Command::Stats { json } => commands::stats::run(json),
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging() {
    use tracing::Level;

    // Commands re-load and report configuration problems themselves, so a
    // broken config here just means default logging settings.
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // Diagnostics go to stderr; stdout is reserved for command output.
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
