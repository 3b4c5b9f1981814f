//! Anthropic API client implementation
//!
//! Implements the `GenerateClient` trait over the Anthropic messages API.
//! Both pipeline stages (outline and prose) run against the same endpoint
//! with different prompts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{ProseforgeError, Result};
use crate::llm::client::GenerateClient;

/// Anthropic API base URL
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model to use
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default max tokens
const DEFAULT_MAX_TOKENS: u32 = 64000;

/// Sampling temperature for both stages
const TEMPERATURE: f64 = 0.7;

/// Configuration for the Anthropic client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&crate::config::ProviderConfig> for AnthropicConfig {
    fn from(cfg: &crate::config::ProviderConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    ///
    /// Reads ANTHROPIC_API_KEY from environment
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProseforgeError::Llm("ANTHROPIC_API_KEY not set".to_string()))?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProseforgeError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_key, config })
    }

    /// Build the prose-expansion prompt.
    fn prose_prompt(outline: &str, target_length: usize, instructions: &str) -> String {
        let mut prompt = format!(
            "Please transform this outline into a complete, well-written text:\n\n\
             {}\n\n\
             Target length: approximately {} characters.",
            outline, target_length
        );
        if !instructions.is_empty() {
            prompt.push_str(&format!("\n\nAdditional instructions: {}", instructions));
        }
        prompt
    }

    /// Build the outline-generation prompt. An optional sample outline is
    /// included as a reference for structure and quality only.
    fn outline_prompt(source_text: &str, instructions: &str, sample_text: Option<&str>) -> String {
        let mut prompt = format!("Original text to analyze:\n{}\n\n", source_text);

        if instructions.is_empty() {
            prompt.push_str("Additional instructions: none.\n");
        } else {
            prompt.push_str(&format!("Additional instructions: {}\n", instructions));
        }

        if let Some(sample) = sample_text {
            prompt.push_str(&format!(
                "\nEXAMPLE OF IDEAL OUTLINE FORMAT (use as reference for structure and quality):\n\
                 {}\n\n\
                 Use this example as a reference for the quality and format of your outline, \
                 but create a completely new outline based on the provided text.\n",
                sample
            ));
        }

        prompt.push_str("\nPlease create a structured outline based on this text.");
        prompt
    }

    fn build_request(&self, user_prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": TEMPERATURE,
            "messages": [
                { "role": "user", "content": user_prompt }
            ]
        })
    }

    /// Extract the concatenated text blocks from a messages response.
    fn parse_response(body: Value) -> Result<String> {
        let mut content = String::new();
        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                if block["type"].as_str() == Some("text")
                    && let Some(text) = block["text"].as_str()
                {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                }
            }
        }

        if content.is_empty() {
            return Err(ProseforgeError::Llm("Empty response from provider".to_string()));
        }

        if let Some(usage) = body.get("usage") {
            tracing::debug!(
                input_tokens = usage["input_tokens"].as_u64().unwrap_or(0),
                output_tokens = usage["output_tokens"].as_u64().unwrap_or(0),
                "Provider-reported usage"
            );
        }

        Ok(content)
    }

    /// Send a request to the Anthropic API
    async fn send_request(&self, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProseforgeError::Llm(format!("Request failed: {}", e)))?;

        let status = response.status();

        // Handle rate limiting
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProseforgeError::RateLimited { retry_after_secs });
        }

        // Handle other errors
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProseforgeError::Llm(format!("API error {}: {}", status, error_body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProseforgeError::Llm(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl GenerateClient for AnthropicClient {
    async fn generate_outline(
        &self,
        source_text: &str,
        instructions: &str,
        sample_text: Option<&str>,
    ) -> Result<String> {
        let prompt = Self::outline_prompt(source_text, instructions, sample_text);
        let body = self.send_request(self.build_request(&prompt)).await?;
        Self::parse_response(body)
    }

    async fn generate_prose(&self, outline: &str, target_length: usize, instructions: &str) -> Result<String> {
        let prompt = Self::prose_prompt(outline, target_length, instructions);
        let body = self.send_request(self.build_request(&prompt)).await?;
        Self::parse_response(body)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.config.model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}
