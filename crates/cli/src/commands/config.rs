use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use haggler_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let file = config_file_doc.as_ref();
    let path = config_file_path.as_deref();

    let api_key = config
        .engine
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let rows: Vec<(&str, String, Option<&str>)> = vec![
        ("database.url", config.database.url.clone(), Some("HAGGLER_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("HAGGLER_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("HAGGLER_DATABASE_TIMEOUT_SECS"),
        ),
        ("engine.kind", config.engine.kind.as_str().to_string(), Some("HAGGLER_ENGINE")),
        ("engine.model", config.engine.model.clone(), Some("HAGGLER_ENGINE_MODEL")),
        ("engine.api_key", api_key, Some("HAGGLER_ENGINE_API_KEY")),
        (
            "engine.endpoint",
            config.engine.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("HAGGLER_ENGINE_ENDPOINT"),
        ),
        (
            "engine.timeout_secs",
            config.engine.timeout_secs.to_string(),
            Some("HAGGLER_ENGINE_TIMEOUT_SECS"),
        ),
        (
            "engine.max_retries",
            config.engine.max_retries.to_string(),
            Some("HAGGLER_ENGINE_MAX_RETRIES"),
        ),
        ("mail.enabled", config.mail.enabled.to_string(), Some("HAGGLER_MAIL_ENABLED")),
        (
            "mail.from_address",
            config.mail.from_address.clone().unwrap_or_else(|| "<unset>".to_string()),
            Some("HAGGLER_MAIL_FROM_ADDRESS"),
        ),
        ("logging.level", config.logging.level.clone(), Some("HAGGLER_LOGGING_LEVEL")),
        (
            "logging.format",
            config.logging.format.as_str().to_string(),
            Some("HAGGLER_LOGGING_FORMAT"),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (field, value, env_var) in rows {
        lines.push(render_line(field, &value, field_source(field, env_var, file, path)));
    }
    lines.join("\n")
}

fn render_line(field: &str, value: &str, source: String) -> String {
    format!("  {field} = {value}  [{source}]")
}

fn field_source(
    field: &str,
    env_var: Option<&str>,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(var) = env_var {
        if env::var(var).is_ok() {
            return format!("env:{var}");
        }
    }
    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_has_field(doc, field) {
            return format!("file:{}", path.display());
        }
    }
    "default".to_string()
}

fn file_has_field(doc: &Value, field: &str) -> bool {
    let mut current = doc;
    for part in field.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    // Same lookup order the config loader uses.
    [PathBuf::from("haggler.toml"), PathBuf::from("config/haggler.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn redact_secret(value: &str) -> String {
    if value.chars().count() <= 6 {
        "***".to_string()
    } else {
        let prefix: String = value.chars().take(6).collect();
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::{file_has_field, redact_secret};

    #[test]
    fn redaction_keeps_only_a_short_prefix() {
        assert_eq!(redact_secret("sk-test-1234567890"), "sk-tes***");
        assert_eq!(redact_secret("short"), "***");
    }

    #[test]
    fn effective_listing_covers_the_logging_section() {
        let output = super::run();
        assert!(output.contains("logging.level"));
        assert!(output.contains("logging.format"));
    }

    #[test]
    fn nested_field_lookup_walks_tables() {
        let doc: toml::Value =
            "[engine]\nmodel = \"llama3.1:8b\"\n".parse().expect("parse toml");
        assert!(file_has_field(&doc, "engine.model"));
        assert!(!file_has_field(&doc, "engine.api_key"));
        assert!(!file_has_field(&doc, "database.url"));
    }
}
