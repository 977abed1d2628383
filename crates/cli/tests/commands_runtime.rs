use std::env;
use std::sync::{Mutex, OnceLock};

use haggler_cli::commands::{history, migrate, stats};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("HAGGLER_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "schema is current (1 migrations applied)");
    });
}

#[test]
fn migrate_reports_config_failure_for_bad_override() {
    with_env(&[("HAGGLER_ENGINE", "gpt-neox")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn history_on_an_empty_ledger_reports_no_records() {
    with_env(&[("HAGGLER_DATABASE_URL", "sqlite::memory:")], || {
        let result = history::run(history::HistoryArgs { limit: 10, service: None, json: false });
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "no negotiations recorded yet");
    });
}

#[test]
fn history_json_output_is_an_empty_array() {
    with_env(&[("HAGGLER_DATABASE_URL", "sqlite::memory:")], || {
        let result = history::run(history::HistoryArgs { limit: 10, service: None, json: true });
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload, Value::Array(Vec::new()));
    });
}

#[test]
fn stats_on_an_empty_ledger_reports_zeroes() {
    with_env(&[("HAGGLER_DATABASE_URL", "sqlite::memory:")], || {
        let result = stats::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["summary"]["total_negotiations"], 0);
        assert_eq!(payload["summary"]["successes"], 0);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HAGGLER_DATABASE_URL",
        "HAGGLER_DATABASE_MAX_CONNECTIONS",
        "HAGGLER_DATABASE_TIMEOUT_SECS",
        "HAGGLER_ENGINE",
        "HAGGLER_ENGINE_MODEL",
        "HAGGLER_ENGINE_API_KEY",
        "HAGGLER_ENGINE_ENDPOINT",
        "HAGGLER_ENGINE_TIMEOUT_SECS",
        "HAGGLER_ENGINE_MAX_RETRIES",
        "HAGGLER_MAIL_ENABLED",
        "HAGGLER_MAIL_FROM_ADDRESS",
        "HAGGLER_MAIL_SIGNATURE",
        "HAGGLER_LOGGING_LEVEL",
        "HAGGLER_LOGGING_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
