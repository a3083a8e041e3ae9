use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{markers, render_system_prompt, send_json, RateLimits, TranslationBackend};
use crate::app_config::{ProviderConfig, TranslationCommonConfig};
use crate::errors::ProviderError;

/// Anthropic client for interacting with Anthropic API
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    config: ProviderConfig,
    common: TranslationCommonConfig,
    source_language: String,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(config: ProviderConfig, common: TranslationCommonConfig, source_language: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            config,
            common,
            source_language: source_language.to_string(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/v1/messages", self.config.endpoint.trim_end_matches('/'))
    }

    /// Extract text from Anthropic response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[async_trait]
impl TranslationBackend for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn batch_token_limit(&self) -> usize {
        self.config.max_tokens_per_batch
    }

    fn batch_segment_limit(&self) -> usize {
        self.config.max_segments_per_batch
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits {
            requests_per_minute: self.config.requests_per_minute,
            tokens_per_minute: self.config.tokens_per_minute,
        }
    }

    async fn translate(
        &self,
        batch: &[String],
        target_language: &str,
        hint: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let system = format!(
            "{}\n\n{}",
            render_system_prompt(&self.common.system_prompt, &self.source_language, target_language),
            markers::MARKER_INSTRUCTIONS
        );
        let mut user = String::new();
        if let Some(hint) = hint {
            user.push_str(&format!("Context: {}\n\n", hint));
        }
        user.push_str(&markers::pack(batch));

        // Output is roughly the size of the input; leave generous headroom
        let max_tokens = (self.config.max_tokens_per_batch * 3).clamp(1024, 8192) as u32;
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: user,
            }],
            system: Some(system),
            temperature: Some(self.common.temperature),
            max_tokens,
        };

        let builder = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request);
        let response: AnthropicResponse = send_json(builder, "Anthropic").await?;
        debug!(
            "Anthropic: {} input / {} output tokens",
            response.usage.input_tokens, response.usage.output_tokens
        );

        markers::split(&Self::extract_text_from_response(&response), batch.len())
    }
}
