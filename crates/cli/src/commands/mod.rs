pub mod config;
pub mod doctor;
pub mod history;
pub mod migrate;
pub mod propose;
pub mod simulate;
pub mod stats;

use serde::Serialize;

use haggler_core::domain::negotiation::NegotiationContext;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn plain(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared clap arguments describing one negotiation turn. The context can
/// come from a TOML file, from flags, or from a file with flag overrides.
#[derive(Debug, clap::Args)]
pub struct ContextArgs {
    #[arg(long, value_name = "FILE", help = "Load the negotiation context from a TOML file")]
    pub context: Option<std::path::PathBuf>,
    #[arg(
        long,
        required_unless_present = "context",
        help = "The vendor's renewal or pricing message"
    )]
    pub vendor_message: Option<String>,
    #[arg(long, required_unless_present = "context", help = "Current monthly price in dollars")]
    pub past_price: Option<f64>,
    #[arg(long, required_unless_present = "context", help = "Desired monthly price in dollars")]
    pub target_price: Option<f64>,
    #[arg(long, help = "Kind of service being negotiated")]
    pub service_type: Option<String>,
    #[arg(long, help = "Length of the vendor relationship")]
    pub relationship: Option<String>,
}

#[derive(serde::Deserialize)]
struct ContextFile {
    vendor_message: String,
    past_price: f64,
    target_price: f64,
    #[serde(default = "default_service_type")]
    service_type: String,
    #[serde(default = "default_relationship")]
    relationship: String,
}

fn default_service_type() -> String {
    "SaaS Subscription".to_string()
}

fn default_relationship() -> String {
    "1-3 Years".to_string()
}

impl ContextArgs {
    pub fn resolve(self) -> Result<NegotiationContext, String> {
        let mut context = match &self.context {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|error| {
                    format!("could not read context file `{}`: {error}", path.display())
                })?;
                let file: ContextFile = toml::from_str(&raw).map_err(|error| {
                    format!("could not parse context file `{}`: {error}", path.display())
                })?;
                NegotiationContext {
                    vendor_message: file.vendor_message,
                    past_price: file.past_price,
                    target_price: file.target_price,
                    service_type: file.service_type,
                    relationship: file.relationship,
                }
            }
            None => NegotiationContext {
                vendor_message: String::new(),
                past_price: 0.0,
                target_price: 0.0,
                service_type: default_service_type(),
                relationship: default_relationship(),
            },
        };

        if let Some(vendor_message) = self.vendor_message {
            context.vendor_message = vendor_message;
        }
        if let Some(past_price) = self.past_price {
            context.past_price = past_price;
        }
        if let Some(target_price) = self.target_price {
            context.target_price = target_price;
        }
        if let Some(service_type) = self.service_type {
            context.service_type = service_type;
        }
        if let Some(relationship) = self.relationship {
            context.relationship = relationship;
        }

        if context.past_price <= 0.0 || context.target_price <= 0.0 {
            return Err("past_price and target_price must be positive".to_string());
        }

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::ContextArgs;

    fn bare_args() -> ContextArgs {
        ContextArgs {
            context: None,
            vendor_message: Some("Renewal at $1000/month.".to_string()),
            past_price: Some(1000.0),
            target_price: Some(800.0),
            service_type: None,
            relationship: None,
        }
    }

    #[test]
    fn flags_resolve_with_defaults() {
        let context = bare_args().resolve().expect("resolve");
        assert_eq!(context.past_price, 1000.0);
        assert_eq!(context.service_type, "SaaS Subscription");
        assert_eq!(context.relationship, "1-3 Years");
    }

    #[test]
    fn nonpositive_prices_are_rejected() {
        let mut args = bare_args();
        args.target_price = Some(0.0);
        assert!(args.resolve().is_err());
    }

    #[test]
    fn file_context_accepts_flag_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(
            &mut file,
            b"vendor_message = \"Renewal at $500/month.\"\npast_price = 500.0\ntarget_price = 400.0\n",
        )
        .expect("write context");

        let args = ContextArgs {
            context: Some(file.path().to_path_buf()),
            vendor_message: None,
            past_price: None,
            target_price: Some(350.0),
            service_type: None,
            relationship: None,
        };

        let context = args.resolve().expect("resolve");
        assert_eq!(context.past_price, 500.0);
        assert_eq!(context.target_price, 350.0);
        assert_eq!(context.vendor_message, "Renewal at $500/month.");
    }
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}
