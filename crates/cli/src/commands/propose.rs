use std::collections::BTreeMap;

use haggler_agent::{build_client, Generated, NegotiationPipeline, OutputSource};
use haggler_core::config::{AppConfig, LoadOptions};
use haggler_core::domain::negotiation::{Proposal, Strategy};

use super::{current_thread_runtime, CommandResult, ContextArgs};

#[derive(Debug, clap::Args)]
pub struct ProposeArgs {
    #[command(flatten)]
    pub context: ContextArgs,
    #[arg(long, help = "Emit machine-readable JSON output")]
    pub json: bool,
}

pub fn run(args: ProposeArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "propose",
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
                "propose",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let context = match args.context.resolve() {
        Ok(context) => context,
        Err(message) => {
            return CommandResult::failure("propose", "context_args", message, 2);
        }
    };
    let result = runtime.block_on(async {
        let client = build_client(&config.engine)
            .await
            .map_err(|error| ("engine_unavailable", error.to_string(), 4u8))?;
        let pipeline = NegotiationPipeline::new(client);
        Ok::<_, (&'static str, String, u8)>(pipeline.generate_proposals(&context).await)
    });

    match result {
        Ok(proposals) => {
            if args.json {
                let output = serde_json::to_string_pretty(&proposals)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
                CommandResult::plain(output)
            } else {
                CommandResult::plain(render_proposals(&proposals))
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("propose", error_class, message, exit_code)
        }
    }
}

pub(crate) fn render_proposals(proposals: &BTreeMap<Strategy, Generated<Proposal>>) -> String {
    let mut lines = Vec::new();
    for (strategy, generated) in proposals {
        lines.push(format!("=== {} ===", strategy_title(*strategy)));
        if generated.source != OutputSource::FirstAttempt {
            lines.push(format!("(source: {})", generated.source.as_str()));
        }
        lines.push(generated.value.content.clone());
        lines.push(format!("Reasoning: {}", generated.value.reasoning));
        lines.push(format!("Expected outcome: {}", generated.value.expected_outcome));
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

fn strategy_title(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Polite => "Polite",
        Strategy::Firm => "Firm",
        Strategy::TermSwap => "Term Swap",
    }
}
