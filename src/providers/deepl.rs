use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{send_json, RateLimits, TranslationBackend};
use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;

/// Element DeepL is told to leave untouched
const KEEP_TAG: &str = "x";

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(?:TAG|NUM|URL|EMAIL)_\d+\}").unwrap());

static WRAPPED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<x>\s*(\{[A-Za-z]+_\d+\})\s*</x>").unwrap());

/// DeepL client. Batches map directly onto the API's `text` array.
///
/// Placeholder tokens travel inside `<x>` elements listed in `ignore_tags`
/// with XML tag handling on, so DeepL neither translates nor reorders their
/// contents.
#[derive(Debug)]
pub struct DeepL {
    client: Client,
    config: ProviderConfig,
    source_language: String,
}

/// Translate request body
#[derive(Debug, Serialize)]
pub struct DeepLRequest<'a> {
    text: Vec<String>,
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    preserve_formatting: bool,
    tag_handling: &'static str,
    ignore_tags: [&'static str; 1],
}

impl<'a> DeepLRequest<'a> {
    pub fn new(batch: &[String], target_lang: String, source_lang: Option<String>, context: Option<&'a str>) -> Self {
        Self {
            text: batch.iter().map(|text| wrap_tokens(text)).collect(),
            target_lang,
            source_lang,
            context,
            preserve_formatting: true,
            tag_handling: "xml",
            ignore_tags: [KEEP_TAG],
        }
    }
}

/// Wrap every placeholder token in an ignored element
pub fn wrap_tokens(text: &str) -> String {
    TOKEN.replace_all(text, "<x>$0</x>").into_owned()
}

/// Drop the ignored elements around tokens again
pub fn unwrap_tokens(text: &str) -> String {
    WRAPPED_TOKEN.replace_all(text, "$1").into_owned()
}

/// Translate response body
#[derive(Debug, Deserialize)]
pub struct DeepLResponse {
    pub translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
pub struct DeepLTranslation {
    #[serde(default)]
    pub detected_source_language: Option<String>,
    pub text: String,
}

impl DeepL {
    pub fn new(config: ProviderConfig, source_language: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            config,
            source_language: source_language.to_string(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/translate", self.config.endpoint.trim_end_matches('/'))
    }
}

/// DeepL target codes: uppercase, with the regional variants it insists on
pub fn target_code(language: &str) -> String {
    let code = language.trim().replace('_', "-").to_uppercase();
    match code.as_str() {
        "EN" => "EN-US".to_string(),
        "PT" => "PT-PT".to_string(),
        _ => code,
    }
}

/// DeepL source codes never carry a region
pub fn source_code(language: &str) -> String {
    language
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

#[async_trait]
impl TranslationBackend for DeepL {
    fn name(&self) -> &str {
        "deepl"
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
        let source = source_code(&self.source_language);
        let request = DeepLRequest::new(
            batch,
            target_code(target_language),
            (!source.is_empty() && source != "AUTO").then_some(source),
            hint,
        );

        debug!("DeepL: translating {} strings", batch.len());
        let builder = self
            .client
            .post(self.api_url())
            .header("Authorization", format!("DeepL-Auth-Key {}", self.config.api_key))
            .json(&request);
        let response: DeepLResponse = send_json(builder, "DeepL").await?;

        if response.translations.len() != batch.len() {
            return Err(ProviderError::BatchMismatch {
                sent: batch.len(),
                received: response.translations.len(),
            });
        }
        Ok(response
            .translations
            .into_iter()
            .map(|t| unwrap_tokens(&t.text))
            .collect())
    }
}
