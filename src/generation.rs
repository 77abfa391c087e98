//! Generative model providers.
//!
//! Defines the [`GenerativeModel`] trait and its implementations:
//! - **[`GeminiProvider`]**: Google Generative Language `generateContent` API.
//! - **[`OpenAIChatProvider`]**: OpenAI Chat Completions.
//! - **[`OllamaGenerateProvider`]**: a local Ollama instance's `/api/generate`.
//! - **[`DisabledGenerator`]**: always fails.
//!
//! Unlike embedding calls, generation is never retried. Each call is bounded
//! by the configured timeout and its outcome is reported as a
//! [`GenerationOutcome`] so the caller decides how to surface a failure.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::ProviderError;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce the answer text for a fully composed prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Result of one generation call.
#[derive(Debug)]
pub enum GenerationOutcome {
    Answered(String),
    Failed(ProviderError),
}

/// Call `model` with `prompt`, giving up after `timeout`.
pub async fn generate_with_timeout(
    model: &dyn GenerativeModel,
    prompt: &str,
    timeout: Duration,
) -> GenerationOutcome {
    match tokio::time::timeout(timeout, model.generate(prompt)).await {
        Ok(Ok(text)) => GenerationOutcome::Answered(text),
        Ok(Err(e)) => {
            tracing::warn!(model = model.model_name(), error = %e, "generation failed");
            GenerationOutcome::Failed(e.into())
        }
        Err(_) => {
            tracing::warn!(model = model.model_name(), ?timeout, "generation timed out");
            GenerationOutcome::Failed(ProviderError(format!(
                "generation timed out after {:?}",
                timeout
            )))
        }
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerativeModel for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ Gemini ============

/// Google Gemini via the `generateContent` REST endpoint.
///
/// The key is read from `GOOGLE_API_KEY` when the provider is built; a
/// missing key is reported on the first call so the server can still start.
pub struct GeminiProvider {
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key: std::env::var("GOOGLE_API_KEY").ok(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            bail!("GOOGLE_API_KEY environment variable not set");
        };
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let json = read_json(response, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let Some(candidate) = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        bail!("Gemini returned no answer: {}", reason);
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("empty response");
        bail!("Gemini returned no text: {}", reason);
    }
    Ok(text)
}

// ============ OpenAI ============

/// OpenAI Chat Completions with the prompt as a single user message.
pub struct OpenAIChatProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl GenerativeModel for OpenAIChatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let json = read_json(response, "OpenAI").await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

pub struct OllamaGenerateProvider {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerateProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl GenerativeModel for OllamaGenerateProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await?;

        let json = read_json(response, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn read_json(response: reqwest::Response, label: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body_text);
    }
    Ok(response.json().await?)
}

/// Create the [`GenerativeModel`] named by `generation.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"openai"` | [`OpenAIChatProvider`] |
/// | `"ollama"` | [`OllamaGenerateProvider`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerativeModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Box::new(OpenAIChatProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerateProvider::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
