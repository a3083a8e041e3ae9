use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{markers, render_system_prompt, send_json, RateLimits, TranslationBackend};
use crate::app_config::{ProviderConfig, TranslationCommonConfig, TranslationProvider};
use crate::errors::ProviderError;

/// OpenAI chat completions client. LM Studio exposes the same API locally.
#[derive(Debug)]
pub struct OpenAI {
    client: Client,
    provider: TranslationProvider,
    config: ProviderConfig,
    common: TranslationCommonConfig,
    source_language: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl OpenAI {
    pub fn new(
        provider: TranslationProvider,
        config: ProviderConfig,
        common: TranslationCommonConfig,
        source_language: &str,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            provider,
            config,
            common,
            source_language: source_language.to_string(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    /// Build the chat request for a packed batch
    pub fn build_request(&self, batch: &[String], target_language: &str, hint: Option<&str>) -> ChatCompletionRequest {
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

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: Some(self.common.temperature),
        }
    }
}

#[async_trait]
impl TranslationBackend for OpenAI {
    fn name(&self) -> &str {
        match self.provider {
            TranslationProvider::LMStudio => "lmstudio",
            _ => "openai",
        }
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
        let request = self.build_request(batch, target_language, hint);

        let mut builder = self.client.post(self.api_url()).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        let response: ChatCompletionResponse = send_json(builder, self.provider.display_name()).await?;

        if let Some(usage) = &response.usage {
            debug!(
                "{}: {} prompt / {} completion tokens",
                self.name(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::ParseError("No choices in response".to_string()))?;

        markers::split(&content, batch.len())
    }
}
