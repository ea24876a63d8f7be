//! Language model client

use crate::governor::config::LlmConfig;
use crate::governor::{GovernorError, GovernorResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Prompt-to-completion model, one request per call
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the prompt
    async fn complete(&self, prompt: &str) -> GovernorResult<String>;

    /// Backend name reported in service info
    fn provider(&self) -> &str;

    /// Model identifier reported in service info
    fn model(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Client for an Ollama-compatible `/api/generate` endpoint
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> GovernorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.endpoint)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> GovernorResult<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            }
        });

        let start = Instant::now();
        debug!(model = %self.model, prompt_len = prompt.len(), "Calling language model");

        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Language model request failed: {}", e);
                if e.is_timeout() {
                    GovernorError::timeout("language model completion", self.timeout)
                } else {
                    GovernorError::HttpError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, "Language model returned an error");
            return Err(GovernorError::translation_failed(format!(
                "model request failed with {}: {}",
                status,
                text.trim()
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let completion = parsed
            .response
            .ok_or_else(|| GovernorError::translation_failed("model response has no 'response' field"))?;

        info!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Language model call completed"
        );
        Ok(completion)
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
