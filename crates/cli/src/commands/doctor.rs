use serde::Serialize;

use haggler_agent::build_client;
use haggler_core::config::{AppConfig, EngineKind, LoadOptions};
use haggler_db::connect;

use super::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_engine_readiness(&config));
            checks.push(check_database_connectivity(&config));
            checks.push(check_mail_channel(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["engine_readiness", "database_connectivity", "mail_channel"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks
        .iter()
        .all(|check| matches!(check.status, CheckStatus::Pass | CheckStatus::Skipped))
        && checks.iter().any(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_engine_readiness(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "engine_readiness",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    // For ollama this probes the server and verifies the model is pulled;
    // for the hosted engine it only checks the credential is present.
    let result = runtime.block_on(async { build_client(&config.engine).await.map(|_| ()) });

    match result {
        Ok(()) => {
            let detail = match config.engine.kind {
                EngineKind::Ollama => {
                    format!("ollama reachable, model `{}` available", config.engine.model)
                }
                EngineKind::OpenAi => {
                    format!("openai credential present for model `{}`", config.engine.model)
                }
            };
            DoctorCheck { name: "engine_readiness", status: CheckStatus::Pass, details: detail }
        }
        Err(error) => DoctorCheck {
            name: "engine_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn check_mail_channel(config: &AppConfig) -> DoctorCheck {
    if !config.mail.enabled {
        return DoctorCheck {
            name: "mail_channel",
            status: CheckStatus::Skipped,
            details: "mail is disabled".to_string(),
        };
    }

    match haggler_mail::DraftMailer::new(&config.mail) {
        Ok(_) => DoctorCheck {
            name: "mail_channel",
            status: CheckStatus::Pass,
            details: format!(
                "draft channel ready for `{}`",
                config.mail.from_address.as_deref().unwrap_or("<unset>")
            ),
        },
        Err(error) => DoctorCheck {
            name: "mail_channel",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
