use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{markers, render_system_prompt, send_json, RateLimits, TranslationBackend};
use crate::app_config::{ProviderConfig, TranslationCommonConfig};
use crate::errors::ProviderError;

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    client: Client,
    config: ProviderConfig,
    common: TranslationCommonConfig,
    source_language: String,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    stream: bool,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

impl Ollama {
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
        format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl TranslationBackend for Ollama {
    fn name(&self) -> &str {
        "ollama"
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
        let mut prompt = String::new();
        if let Some(hint) = hint {
            prompt.push_str(&format!("Context: {}\n\n", hint));
        }
        prompt.push_str(&markers::pack(batch));

        let request = GenerationRequest {
            model: self.config.model.clone(),
            prompt,
            system: Some(system),
            options: Some(GenerationOptions {
                temperature: Some(self.common.temperature),
                num_predict: None,
            }),
            stream: false,
        };

        let builder = self.client.post(self.api_url()).json(&request);
        let response: GenerationResponse = send_json(builder, "Ollama").await?;
        if !response.done {
            return Err(ProviderError::ParseError(
                "Ollama returned an incomplete generation".to_string(),
            ));
        }
        debug!(
            "Ollama ({}): {:?} prompt / {:?} generated tokens",
            response.model, response.prompt_eval_count, response.eval_count
        );

        markers::split(&response.response, batch.len())
    }
}
