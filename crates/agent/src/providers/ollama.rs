//! Local Ollama inference provider.
//!
//! The constructor probes the server for liveness and for the configured
//! model, so a misconfigured local setup fails at startup rather than on
//! the first negotiation turn.

use std::time::Duration;

use async_trait::async_trait;
use haggler_core::config::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::engine::{
    with_transport_retry, EngineError, EngineInfo, GenerateClient, TransportFailure,
};
use crate::providers::MAX_OUTPUT_TOKENS;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl OllamaClient {
    /// Connects to the server and verifies the configured model is pulled.
    /// Both an unreachable server and an absent model are startup-fatal.
    pub async fn connect(config: &EngineConfig) -> Result<Self, EngineError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| EngineError::Unavailable("engine.endpoint is not configured".into()))?
            .trim_end_matches('/')
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| EngineError::Unavailable(format!("http client init failed: {error}")))?;

        let client =
            Self { http, endpoint, model: config.model.clone(), max_retries: config.max_retries };
        client.verify_model().await?;
        Ok(client)
    }

    async fn verify_model(&self) -> Result<(), EngineError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|error| {
                EngineError::Unavailable(format!(
                    "cannot connect to ollama at {}: {error}. Make sure it is running with: \
                     ollama serve",
                    self.endpoint
                ))
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Unavailable(format!(
                "ollama server not responding (status {})",
                response.status()
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|error| {
            EngineError::Unavailable(format!("ollama tags response was malformed: {error}"))
        })?;

        let model_names: Vec<String> = tags.models.into_iter().map(|model| model.name).collect();
        if !model_names.iter().any(|name| name == &self.model) {
            let available = if model_names.is_empty() {
                "none".to_string()
            } else {
                model_names.join(", ")
            };
            return Err(EngineError::Unavailable(format!(
                "model `{}` not found in ollama (available: {available}). Run: ollama pull {}",
                self.model, self.model
            )));
        }

        Ok(())
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, TransportFailure> {
        // Ollama's plain generate endpoint takes one prompt, so the system
        // and user roles are folded into a single transcript.
        let prompt = format!("System: {system_prompt}\n\nUser: {user_prompt}\n\nAssistant:");
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions { temperature, num_predict: MAX_OUTPUT_TOKENS },
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure(format!("ollama returned status {status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response.trim().to_string())
    }
}

#[async_trait]
impl GenerateClient for OllamaClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, EngineError> {
        with_transport_retry("ollama", self.max_retries, || {
            self.complete(system_prompt, user_prompt, temperature)
        })
        .await
    }

    fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            engine: "ollama",
            model: self.model.clone(),
            endpoint: Some(self.endpoint.clone()),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}
