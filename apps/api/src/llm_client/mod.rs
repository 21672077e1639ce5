//! LLM Client: the single point of entry for all upstream AI calls.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! Providers only perform one HTTP round-trip; retry, circuit breaking and
//! cost guards live in [`client::AiClient`].
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::resilience::Transient;

pub mod client;
pub mod prompts;

pub use client::{AiClient, PromptPair, ProviderRoute};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Model for full analyses.
pub const MODEL: &str = "claude-sonnet-4-5";
/// Cheaper model used by the secondary route with the simplified prompt.
pub const FALLBACK_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_) => true,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::EmptyContent => false,
        }
    }
}

/// A fully rendered prompt ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_output_tokens: u32,
}

impl Prompt {
    /// Rough token estimate: ~4 characters per token for the input, plus the
    /// full output allowance.
    pub fn estimated_tokens(&self) -> u32 {
        let chars = self.system.chars().count() + self.user.chars().count();
        (chars as u32).div_ceil(4) + self.max_output_tokens
    }
}

/// One upstream AI backend. Implementations perform a single attempt and
/// return the raw text the model produced.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic Messages API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct AnthropicProvider {
    name: &'static str,
    client: Client,
    api_key: String,
    model: &'static str,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(
        name: &'static str,
        api_key: String,
        model: &'static str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name,
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            timeout,
        })
    }

    async fn send(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let request_body = AnthropicRequest {
            model: self.model,
            max_tokens: prompt.max_output_tokens,
            system: &prompt.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;
        debug!(
            "{} call succeeded: input_tokens={}, output_tokens={}",
            self.name, llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        llm_response
            .text()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or(ProviderError::EmptyContent)
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        match tokio::time::timeout(self.timeout, self.send(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
