//! Hosted OpenAI-compatible chat-completions provider.
//!
//! Construction is cheap and performs no I/O: unlike the local provider,
//! the hosted API defers failure to the first call.

use std::time::Duration;

use async_trait::async_trait;
use haggler_core::config::EngineConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::engine::{
    with_transport_retry, EngineError, EngineInfo, GenerateClient, TransportFailure,
};
use crate::providers::MAX_OUTPUT_TOKENS;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EngineError::Unavailable("engine.api_key is not configured".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| EngineError::Unavailable(format!("http client init failed: {error}")))?;

        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { http, api_key, model: config.model.clone(), base_url, max_retries: config.max_retries })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, TransportFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature,
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure(format!("openai returned status {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl GenerateClient for OpenAiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, EngineError> {
        with_transport_retry("openai", self.max_retries, || {
            self.chat(system_prompt, user_prompt, temperature)
        })
        .await
    }

    fn engine_info(&self) -> EngineInfo {
        let endpoint =
            (self.base_url != DEFAULT_BASE_URL).then(|| self.base_url.clone());
        EngineInfo { engine: "openai", model: self.model.clone(), endpoint }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use haggler_core::config::{EngineConfig, EngineKind};

    use super::OpenAiClient;
    use crate::engine::{EngineError, GenerateClient};

    fn config(api_key: Option<&str>, endpoint: Option<&str>) -> EngineConfig {
        EngineConfig {
            kind: EngineKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key: api_key.map(|key| key.to_string().into()),
            endpoint: endpoint.map(str::to_string),
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    #[test]
    fn construction_requires_api_key() {
        let error = OpenAiClient::new(&config(None, None)).err().expect("must fail");
        assert!(matches!(error, EngineError::Unavailable(_)));
    }

    #[test]
    fn engine_info_omits_endpoint_for_default_base_url() {
        let client = OpenAiClient::new(&config(Some("sk-test"), None)).expect("construct");
        let info = client.engine_info();
        assert_eq!(info.engine, "openai");
        assert_eq!(info.model, "gpt-4o-mini");
        assert_eq!(info.endpoint, None);
    }

    #[test]
    fn engine_info_reports_custom_endpoint() {
        let client = OpenAiClient::new(&config(Some("sk-test"), Some("http://localhost:8000/v1/")))
            .expect("construct");
        assert_eq!(client.engine_info().endpoint.as_deref(), Some("http://localhost:8000/v1"));
    }
}
