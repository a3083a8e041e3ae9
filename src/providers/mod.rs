/*!
 * Translation backends.
 *
 * Every backend implements the small `TranslationBackend` capability trait:
 * translate an ordered batch of masked strings into the target language and
 * return exactly as many strings, in order. Backends make a single attempt
 * per call; retries, backoff and failover belong to the orchestrator.
 *
 * - `deepl`: DeepL machine translation API (native string arrays)
 * - `openai`: OpenAI chat completions, also used for LM Studio
 * - `anthropic`: Anthropic messages API
 * - `ollama`: Local Ollama server
 * - `mock`: Scripted backend for tests
 * - `markers`: `<<ENTRY_n>>` packing shared by the LLM backends
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod deepl;
pub mod markers;
pub mod mock;
pub mod ollama;
pub mod openai;

/// Throughput granted by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimits {
    /// Requests per minute, `None` for unlimited
    pub requests_per_minute: Option<u32>,
    /// Tokens per minute, `None` for unlimited
    pub tokens_per_minute: Option<u32>,
}

impl RateLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Capability interface of a translation backend
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Stable identifier, also used as the rate limiter key
    fn name(&self) -> &str;

    /// Token budget of one batch
    fn batch_token_limit(&self) -> usize;

    /// Segment ceiling of one batch
    fn batch_segment_limit(&self) -> usize {
        25
    }

    /// Provider throughput
    fn rate_limits(&self) -> RateLimits;

    /// Translate `batch` into `target_language`, one output per input, in order
    async fn translate(
        &self,
        batch: &[String],
        target_language: &str,
        hint: Option<&str>,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Rough token estimate: four ASCII characters per token, one token per
/// non-ASCII character
pub fn estimate_tokens(text: &str) -> usize {
    let (ascii, other) = text
        .chars()
        .fold((0usize, 0usize), |(ascii, other), c| {
            if c.is_ascii() {
                (ascii + 1, other)
            } else {
                (ascii, other + 1)
            }
        });
    ascii.div_ceil(4) + other
}

/// Build the backend for a configured provider
pub fn create_backend(
    provider: TranslationProvider,
    config: &TranslationConfig,
    source_language: &str,
) -> Arc<dyn TranslationBackend> {
    let provider_config = config.resolved_provider_config(provider);
    let common = &config.common;

    match provider {
        TranslationProvider::DeepL => Arc::new(deepl::DeepL::new(provider_config, source_language)),
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => Arc::new(openai::OpenAI::new(
            provider,
            provider_config,
            common.clone(),
            source_language,
        )),
        TranslationProvider::Anthropic => Arc::new(anthropic::Anthropic::new(
            provider_config,
            common.clone(),
            source_language,
        )),
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::new(
            provider_config,
            common.clone(),
            source_language,
        )),
    }
}

/// Send a JSON request and decode a JSON reply, classifying failures
pub(crate) async fn send_json<T>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let response = request.send().await.map_err(ProviderError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        log::warn!("{} API error ({}): {}", provider, status, error_text);

        return Err(match ProviderError::from_status(status.as_u16(), error_text) {
            ProviderError::RateLimitExceeded { message, .. } => ProviderError::RateLimitExceeded {
                message,
                retry_after_secs,
            },
            other => other,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(format!("{} response: {}", provider, e)))
}

/// Render the system prompt template for a language pair
pub fn render_system_prompt(template: &str, source_language: &str, target_language: &str) -> String {
    let source = crate::language_utils::get_language_name(source_language)
        .unwrap_or_else(|_| source_language.to_string());
    let target = crate::language_utils::get_language_name(target_language)
        .unwrap_or_else(|_| target_language.to_string());
    template
        .replace("{source_language}", &source)
        .replace("{target_language}", &target)
}
