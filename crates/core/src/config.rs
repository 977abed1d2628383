//! Immutable application configuration, loaded once at process entry.
//!
//! Precedence: built-in defaults, then an optional `haggler.toml` patch
//! (with `${VAR}` environment interpolation), then `HAGGLER_*` environment
//! overrides, then programmatic overrides. `validate()` is the
//! startup-fatal gate: a configuration problem is the only error class
//! allowed to propagate out of process initialization.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Generative engine selection. Resolved once at startup and fixed for the
/// process lifetime; the adapter in `haggler-agent` consumes this struct
/// rather than reading ambient environment state.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub from_address: Option<String>,
    pub signature: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub engine_kind: Option<EngineKind>,
    pub engine_model: Option<String>,
    pub engine_api_key: Option<String>,
    pub engine_endpoint: Option<String>,
    pub mail_enabled: Option<bool>,
    pub mail_from_address: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://haggler.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            engine: EngineConfig {
                kind: EngineKind::Ollama,
                model: "llama3.1:8b".to_string(),
                api_key: None,
                endpoint: Some("http://localhost:11434".to_string()),
                timeout_secs: 60,
                max_retries: 3,
            },
            mail: MailConfig {
                enabled: false,
                from_address: None,
                signature: "Best regards".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported engine `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("haggler.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(kind) = engine.kind {
                self.engine.kind = kind;
            }
            if let Some(model) = engine.model {
                self.engine.model = model;
            }
            if let Some(api_key_value) = engine.api_key {
                self.engine.api_key = Some(secret_value(api_key_value));
            }
            if let Some(endpoint) = engine.endpoint {
                self.engine.endpoint = Some(endpoint);
            }
            if let Some(timeout_secs) = engine.timeout_secs {
                self.engine.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = engine.max_retries {
                self.engine.max_retries = max_retries;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(enabled) = mail.enabled {
                self.mail.enabled = enabled;
            }
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = Some(from_address);
            }
            if let Some(signature) = mail.signature {
                self.mail.signature = signature;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HAGGLER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HAGGLER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("HAGGLER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HAGGLER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HAGGLER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HAGGLER_ENGINE") {
            self.engine.kind = value.parse()?;
        }
        if let Some(value) = read_env("HAGGLER_ENGINE_MODEL") {
            self.engine.model = value;
        }
        if let Some(value) = read_env("HAGGLER_ENGINE_API_KEY") {
            self.engine.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HAGGLER_ENGINE_ENDPOINT") {
            self.engine.endpoint = Some(value);
        }
        if let Some(value) = read_env("HAGGLER_ENGINE_TIMEOUT_SECS") {
            self.engine.timeout_secs = parse_u64("HAGGLER_ENGINE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HAGGLER_ENGINE_MAX_RETRIES") {
            self.engine.max_retries = parse_u32("HAGGLER_ENGINE_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("HAGGLER_MAIL_ENABLED") {
            self.mail.enabled = parse_bool("HAGGLER_MAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HAGGLER_MAIL_FROM_ADDRESS") {
            self.mail.from_address = Some(value);
        }
        if let Some(value) = read_env("HAGGLER_MAIL_SIGNATURE") {
            self.mail.signature = value;
        }

        if let Some(value) = read_env("HAGGLER_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("HAGGLER_LOGGING_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(engine_kind) = overrides.engine_kind {
            self.engine.kind = engine_kind;
        }
        if let Some(engine_model) = overrides.engine_model {
            self.engine.model = engine_model;
        }
        if let Some(engine_api_key) = overrides.engine_api_key {
            self.engine.api_key = Some(secret_value(engine_api_key));
        }
        if let Some(engine_endpoint) = overrides.engine_endpoint {
            self.engine.endpoint = Some(engine_endpoint);
        }
        if let Some(mail_enabled) = overrides.mail_enabled {
            self.mail.enabled = mail_enabled;
        }
        if let Some(mail_from_address) = overrides.mail_from_address {
            self.mail.from_address = Some(mail_from_address);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_engine(&self.engine)?;
        validate_mail(&self.mail)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("haggler.toml"), PathBuf::from("config/haggler.toml")]
        .into_iter()
        .find(|path| path.exists())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    engine: Option<EnginePatch>,
    mail: Option<MailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    kind: Option<EngineKind>,
    model: Option<String>,
    api_key: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    enabled: Option<bool>,
    from_address: Option<String>,
    signature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.model.trim().is_empty() {
        return Err(ConfigError::Validation("engine.model must not be empty".to_string()));
    }

    if engine.timeout_secs == 0 || engine.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "engine.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match engine.kind {
        EngineKind::OpenAi => {
            let missing = engine
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "engine.api_key is required for the openai engine".to_string(),
                ));
            }
        }
        EngineKind::Ollama => {
            let missing =
                engine.endpoint.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "engine.endpoint is required for the ollama engine".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.enabled {
        let missing =
            mail.from_address.as_ref().map(|value| !value.contains('@')).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "mail.from_address must be a valid address when mail is enabled".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, ConfigOverrides, EngineKind, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate_cleanly() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.kind, EngineKind::Ollama);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[engine]\nkind = \"openai\"\nmodel = \"gpt-4o-mini\"\napi_key = \"sk-test\"\n\n\
             [database]\nurl = \"sqlite::memory:\"\n\n[logging]\nformat = \"json\""
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.engine.kind, EngineKind::OpenAi);
        assert_eq!(config.engine.model, "gpt-4o-mini");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn file_patch_interpolates_environment_variables() {
        std::env::set_var("HAGGLER_TEST_INTERP_KEY", "sk-from-env");
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[engine]\nkind = \"openai\"\nmodel = \"gpt-4o-mini\"\n\
             api_key = \"${{HAGGLER_TEST_INTERP_KEY}}\""
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");
        std::env::remove_var("HAGGLER_TEST_INTERP_KEY");

        use secrecy::ExposeSecret;
        let key = config.engine.api_key.expect("api key set");
        assert_eq!(key.expose_secret(), "sk-from-env");
    }

    #[test]
    fn unset_interpolation_variable_is_fatal() {
        std::env::remove_var("HAGGLER_TEST_INTERP_MISSING");
        let result = super::interpolate_env_vars("url = \"${HAGGLER_TEST_INTERP_MISSING}\"");
        match result {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                assert_eq!(var, "HAGGLER_TEST_INTERP_MISSING");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unterminated_interpolation_expression_is_fatal() {
        let result = super::interpolate_env_vars("url = \"${HAGGLER_TEST_INTERP");
        assert!(matches!(result, Err(ConfigError::UnterminatedInterpolation)));
    }

    #[test]
    fn missing_required_file_is_fatal() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn programmatic_overrides_win_over_defaults() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                engine_kind: Some(EngineKind::OpenAi),
                engine_api_key: Some("sk-test".to_string()),
                engine_model: Some("gpt-4o".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.engine.kind, EngineKind::OpenAi);
        assert_eq!(config.engine.model, "gpt-4o");
    }

    #[test]
    fn openai_engine_without_api_key_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                engine_kind: Some(EngineKind::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("must fail").to_string();
        assert!(message.contains("engine.api_key"));
    }

    #[test]
    fn ollama_engine_without_endpoint_fails_validation() {
        let mut config = AppConfig::default();
        config.engine.endpoint = None;
        let message = config.validate().err().expect("must fail").to_string();
        assert!(message.contains("engine.endpoint"));
    }

    #[test]
    fn unsupported_engine_selector_fails_parsing() {
        let result = "mistral-local".parse::<EngineKind>();
        let message = result.err().expect("must fail").to_string();
        assert!(message.contains("unsupported engine"));
    }

    #[test]
    fn mail_enabled_requires_from_address() {
        let mut config = AppConfig::default();
        config.mail.enabled = true;
        let message = config.validate().err().expect("must fail").to_string();
        assert!(message.contains("mail.from_address"));

        config.mail.from_address = Some("ops@example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
