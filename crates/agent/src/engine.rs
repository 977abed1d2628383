//! The generate capability and its transport-level retry policy.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use haggler_core::config::{EngineConfig, EngineKind};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::providers::{OllamaClient, OpenAiClient};

/// Backoff schedule for transport failures: exponential from 4s, capped
/// at 10s, up to `max_retries` attempts total.
const BASE_BACKOFF: Duration = Duration::from_secs(4);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be constructed or reached at startup.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// The retry schedule was exhausted, or the engine produced an empty body.
    #[error("generation failed after {attempts} attempt(s): {message}")]
    Generation { attempts: u32, message: String },
    /// Unrecognized engine selector. Config validation makes this
    /// unreachable in practice; it exists for defense at the boundary.
    #[error("unsupported engine `{0}`")]
    Unsupported(String),
}

/// Observability descriptor for the resolved provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    pub engine: &'static str,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// One operation: turn a (system, user, temperature) triple into raw text.
/// Implementations guarantee a non-empty string or an error; they never
/// enforce the proposal/vendor-reply schema - that is the pipeline's job.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, EngineError>;

    fn engine_info(&self) -> EngineInfo;
}

#[async_trait]
impl<T: GenerateClient + ?Sized> GenerateClient for Box<T> {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, EngineError> {
        (**self).generate(system_prompt, user_prompt, temperature).await
    }

    fn engine_info(&self) -> EngineInfo {
        (**self).engine_info()
    }
}

/// Resolve the provider variant once from configuration. The Ollama path
/// probes the server and fails fast when it is unreachable or the model is
/// absent; the hosted path defers failure to the first call.
pub async fn build_client(config: &EngineConfig) -> Result<Box<dyn GenerateClient>, EngineError> {
    match config.kind {
        EngineKind::OpenAi => Ok(Box::new(OpenAiClient::new(config)?)),
        EngineKind::Ollama => Ok(Box::new(OllamaClient::connect(config).await?)),
    }
}

/// A provider call outcome before the retry policy is applied. Transport
/// failures (timeouts, connection errors, non-2xx responses) are retryable;
/// nothing else is.
pub(crate) struct TransportFailure(pub String);

impl From<reqwest::Error> for TransportFailure {
    fn from(error: reqwest::Error) -> Self {
        Self(error.to_string())
    }
}

/// Run `call` under the bounded retry schedule. An empty body counts as a
/// transport failure: the contract is a non-empty string or an error.
pub(crate) async fn with_transport_retry<F, Fut>(
    engine: &'static str,
    max_attempts: u32,
    call: F,
) -> Result<String, EngineError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String, TransportFailure>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_failure = String::new();

    for attempt in 1..=max_attempts {
        match call().await {
            Ok(body) if !body.trim().is_empty() => return Ok(body),
            Ok(_) => last_failure = "engine returned an empty body".to_string(),
            Err(TransportFailure(message)) => last_failure = message,
        }

        if attempt < max_attempts {
            let delay = backoff_delay(attempt);
            warn!(
                engine,
                attempt,
                delay_secs = delay.as_secs(),
                failure = %last_failure,
                "transport failure, backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(EngineError::Generation { attempts: max_attempts, message: last_failure })
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BASE_BACKOFF.saturating_mul(1u32 << (attempt - 1).min(8));
    exponential.min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{backoff_delay, with_transport_retry, EngineError, TransportFailure};

    #[test]
    fn backoff_grows_exponentially_and_caps_at_ten_seconds() {
        assert_eq!(backoff_delay(1).as_secs(), 4);
        assert_eq!(backoff_delay(2).as_secs(), 8);
        assert_eq!(backoff_delay(3).as_secs(), 10);
        assert_eq!(backoff_delay(6).as_secs(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_transport_retry("test", 3, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(TransportFailure(format!("connection refused on attempt {attempt}")))
                } else {
                    Ok("{\"ok\": true}".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), "{\"ok\": true}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_schedule_reports_attempt_count_and_last_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<String, EngineError> = with_transport_retry("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportFailure("status 503".to_string())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.err().expect("must fail") {
            EngineError::Generation { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            }
            other => panic!("expected generation failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_body_is_treated_as_transport_failure() {
        let result: Result<String, EngineError> =
            with_transport_retry("test", 2, || async { Ok("   ".to_string()) }).await;

        match result.err().expect("must fail") {
            EngineError::Generation { message, .. } => {
                assert!(message.contains("empty body"));
            }
            other => panic!("expected generation failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_skips_backoff() {
        let calls = AtomicU32::new(0);
        let result = with_transport_retry("test", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("text".to_string()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
