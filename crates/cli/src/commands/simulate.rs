use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use haggler_agent::{build_client, EngineInfo, Generated, NegotiationPipeline};
use haggler_core::config::{AppConfig, LoadOptions};
use haggler_core::domain::negotiation::{Proposal, Strategy, VendorReply};
use haggler_core::domain::outcome::NegotiationOutcome;
use haggler_db::repositories::{NegotiationRepository, ThreadRepository};
use haggler_db::{connect, migrations, SqlNegotiationRepository, SqlThreadRepository};
use haggler_mail::{DraftMailer, MailChannel};

use super::{current_thread_runtime, CommandResult, ContextArgs};

#[derive(Debug, clap::Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub context: ContextArgs,
    #[arg(long, default_value = "polite", help = "Strategy whose proposal is sent to the vendor")]
    pub strategy: Strategy,
    #[arg(long, help = "Record the outcome in the negotiation ledger")]
    pub save: bool,
    #[arg(long, help = "Record the selected proposal as an outbound mail draft to this address")]
    pub draft_to: Option<String>,
    #[arg(long, help = "Emit machine-readable JSON output")]
    pub json: bool,
}

#[derive(Serialize)]
struct DraftReceipt {
    message_id: String,
    thread_id: String,
}

#[derive(Serialize)]
struct SimulateReport {
    engine: EngineInfo,
    selected_strategy: Strategy,
    proposals: BTreeMap<Strategy, Generated<Proposal>>,
    vendor_reply: Generated<VendorReply>,
    outcome: NegotiationOutcome,
    saved: bool,
    draft: Option<DraftReceipt>,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
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
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let context = match args.context.resolve() {
        Ok(context) => context,
        Err(message) => {
            return CommandResult::failure("simulate", "context_args", message, 2);
        }
    };
    let result = runtime.block_on(async {
        let client = build_client(&config.engine)
            .await
            .map_err(|error| ("engine_unavailable", error.to_string(), 4u8))?;
        let pipeline = NegotiationPipeline::new(client);

        let proposals = pipeline.generate_proposals(&context).await;
        let selected = proposals
            .get(&args.strategy)
            .cloned()
            .ok_or_else(|| ("strategy_missing", args.strategy.to_string(), 5u8))?;
        let vendor_reply = pipeline.simulate_vendor_reply(&context, &selected.value).await;

        let outcome = NegotiationOutcome {
            date: Utc::now(),
            service_type: context.service_type.clone(),
            vendor_message: context.vendor_message.clone(),
            original_price: context.past_price,
            target_price: context.target_price,
            final_price: vendor_reply.value.accepted_price.unwrap_or(context.past_price),
            strategy: args.strategy,
            proposal_content: selected.value.content.clone(),
            vendor_response: vendor_reply.value.content.clone(),
            success: vendor_reply.value.success,
        };

        let mut saved = false;
        let mut draft = None;

        if args.save || args.draft_to.is_some() {
            let pool = connect(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 6u8))?;
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 6u8))?;

            if args.save {
                SqlNegotiationRepository::new(pool.clone())
                    .save_outcome(&outcome)
                    .await
                    .map_err(|error| ("ledger_write", error.to_string(), 6u8))?;
                saved = true;
            }

            if let Some(recipient) = &args.draft_to {
                let mailer = DraftMailer::new(&config.mail)
                    .map_err(|error| ("mail_channel", error.to_string(), 7u8))?;
                let subject = format!("Re: {} renewal pricing", context.service_type);
                let handle = mailer
                    .send(recipient, &subject, &selected.value.content, None)
                    .await
                    .map_err(|error| ("mail_channel", error.to_string(), 7u8))?;

                let threads = SqlThreadRepository::new(pool.clone());
                threads
                    .upsert_thread(&handle.thread_id, &context)
                    .await
                    .map_err(|error| ("ledger_write", error.to_string(), 6u8))?;
                threads
                    .log_event(Some(&handle.thread_id), "proposal_drafted", &subject)
                    .await
                    .map_err(|error| ("ledger_write", error.to_string(), 6u8))?;

                draft = Some(DraftReceipt {
                    message_id: handle.message_id,
                    thread_id: handle.thread_id.0.clone(),
                });
            }

            pool.close().await;
        }

        Ok::<_, (&'static str, String, u8)>(SimulateReport {
            engine: pipeline.engine_info(),
            selected_strategy: args.strategy,
            proposals,
            vendor_reply,
            outcome,
            saved,
            draft,
        })
    });

    match result {
        Ok(report) => {
            if args.json {
                let output = serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
                CommandResult::plain(output)
            } else {
                CommandResult::plain(render_report(&report))
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("simulate", error_class, message, exit_code)
        }
    }
}

fn render_report(report: &SimulateReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "engine: {} ({})",
        report.engine.engine, report.engine.model
    ));
    lines.push(String::new());
    lines.push(super::propose::render_proposals(&report.proposals));
    lines.push(String::new());

    lines.push(format!("--- vendor reply (to the {} proposal) ---", report.selected_strategy));
    lines.push(report.vendor_reply.value.content.clone());
    match report.vendor_reply.value.accepted_price {
        Some(price) => lines.push(format!("Accepted price: ${price:.2}/month")),
        None => lines.push("Accepted price: none stated".to_string()),
    }
    lines.push(format!(
        "Negotiation {}",
        if report.outcome.success { "succeeded" } else { "did not succeed" }
    ));
    lines.push(format!(
        "Monthly savings: ${:.2} (${:.2}/year)",
        report.outcome.savings(),
        report.outcome.annual_savings()
    ));

    if report.saved {
        lines.push("Outcome recorded in the ledger.".to_string());
    }
    if let Some(draft) = &report.draft {
        lines.push(format!(
            "Draft recorded: message {} on thread {}",
            draft.message_id, draft.thread_id
        ));
    }

    lines.join("\n")
}
