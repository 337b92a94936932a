// crates/llm_connector/src/openai.rs

use std::time::Duration;

use async_trait::async_trait;
use castmate_config::OpenAiConfig;
use castmate_core::{CastmateError, CastmateResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::{CompletionBackend, CompletionRequest, SpeechBackend, SpeechRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible HTTP client covering both halves of the AI
/// backend: chat completions and text-to-speech.
#[derive(Debug)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    api_key: String,
}

impl OpenAiClient {
    /// Fails immediately when the credential env var is unset; a missing
    /// key is fatal at startup, not mid-session.
    pub fn new(config: OpenAiConfig) -> CastmateResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                CastmateError::Config(format!(
                    "Please set the {} environment variable",
                    config.api_key_env
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| CastmateError::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> CastmateResult<String> {
        let url = format!("{}/chat/completions", self.base_url());

        debug!(model = %request.model, messages = request.messages.len(), "Requesting completion");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": request.model,
                "messages": request.messages,
                "max_tokens": request.max_tokens,
            }))
            .send()
            .await
            .map_err(|e| CastmateError::Network(format!("Completion request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CastmateError::Completion(format!("API error {status}: {text}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CastmateError::Completion(format!("Failed to parse response: {e}")))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(CastmateError::Completion(
                "Completion returned no content".to_string(),
            ));
        }

        Ok(content)
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

#[async_trait]
impl SpeechBackend for OpenAiClient {
    async fn synthesize(&self, request: SpeechRequest) -> CastmateResult<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url());

        debug!(model = %request.model, voice = %request.voice, "Requesting speech synthesis");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": request.model,
                "input": request.input,
                "voice": request.voice,
                "response_format": request.format,
                "speed": request.speed,
            }))
            .send()
            .await
            .map_err(|e| CastmateError::Network(format!("Speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CastmateError::Speech(format!("API error {status}: {text}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| CastmateError::Speech(format!("Failed to read audio body: {e}")))?;

        Ok(audio.to_vec())
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}
