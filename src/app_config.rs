use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::path::Path;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation config
    pub translation: TranslationConfig,

    /// Container safety limits
    #[serde(default)]
    pub container: ContainerConfig,

    /// Output formats and layout
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: DeepL machine translation API
    #[default]
    DeepL,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama
    Ollama,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    /// Every provider, in declaration order
    pub const ALL: [TranslationProvider; 5] = [
        Self::DeepL,
        Self::OpenAI,
        Self::Anthropic,
        Self::Ollama,
        Self::LMStudio,
    ];

    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::DeepL => "DeepL",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::DeepL => "deepl".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Ollama => "ollama".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    /// Hosted providers need an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::DeepL | Self::OpenAI | Self::Anthropic)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deepl" => Ok(Self::DeepL),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name (ignored by DeepL)
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Requests per minute granted by the provider
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    // @field: Tokens per minute granted by the provider
    #[serde(default)]
    pub tokens_per_minute: Option<u32>,

    // @field: Token budget of a single batch
    #[serde(default = "default_max_tokens_per_batch")]
    pub max_tokens_per_batch: usize,

    // @field: Segment ceiling of a single batch
    #[serde(default = "default_max_segments_per_batch")]
    pub max_segments_per_batch: usize,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let base = Self {
            provider_type: provider_type.to_lowercase_string(),
            model: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_timeout_secs(),
            requests_per_minute: None,
            tokens_per_minute: None,
            max_tokens_per_batch: default_max_tokens_per_batch(),
            max_segments_per_batch: default_max_segments_per_batch(),
        };

        match provider_type {
            TranslationProvider::DeepL => Self {
                endpoint: default_deepl_endpoint(),
                requests_per_minute: Some(60),
                max_tokens_per_batch: 30_000,
                max_segments_per_batch: 50,
                ..base
            },
            TranslationProvider::OpenAI => Self {
                model: default_openai_model(),
                endpoint: default_openai_endpoint(),
                requests_per_minute: Some(500),
                tokens_per_minute: Some(200_000),
                ..base
            },
            TranslationProvider::Anthropic => Self {
                model: default_anthropic_model(),
                endpoint: default_anthropic_endpoint(),
                timeout_secs: default_llm_timeout_secs(),
                requests_per_minute: Some(50),
                tokens_per_minute: Some(40_000),
                ..base
            },
            TranslationProvider::Ollama => Self {
                model: default_ollama_model(),
                endpoint: default_ollama_endpoint(),
                timeout_secs: default_llm_timeout_secs(),
                max_tokens_per_batch: 1_500,
                max_segments_per_batch: 10,
                ..base
            },
            TranslationProvider::LMStudio => Self {
                model: default_lmstudio_model(),
                endpoint: default_lmstudio_endpoint(),
                timeout_secs: default_llm_timeout_secs(),
                max_tokens_per_batch: 1_500,
                max_segments_per_batch: 10,
                ..base
            },
        }
    }

    /// Parsed provider type
    pub fn provider(&self) -> Result<TranslationProvider> {
        self.provider_type.parse()
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Primary translation provider
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Providers tried, in order, after the primary one gives up
    #[serde(default)]
    pub fallback_providers: Vec<TranslationProvider>,

    /// Target languages pinned to a specific provider (`"ja": "deepl"`)
    #[serde(default)]
    pub routing: BTreeMap<String, TranslationProvider>,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for LLM providers
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Attempts per backend before failing over
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound of the random jitter added to each backoff
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Batches in flight at the same time
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Fraction of the provider's RPM/TPM grant actually used
    #[serde(default = "default_rate_limit_safety_margin")]
    pub rate_limit_safety_margin: f64,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            temperature: default_temperature(),
            max_concurrent_batches: default_max_concurrent_batches(),
            rate_limit_safety_margin: default_rate_limit_safety_margin(),
        }
    }
}

/// Limits applied when opening a container
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContainerConfig {
    /// Maximum number of archive entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum uncompressed/compressed ratio, per entry and overall
    #[serde(default = "default_max_compression_ratio")]
    pub max_compression_ratio: f64,

    /// Maximum total uncompressed size in bytes
    #[serde(default = "default_max_total_uncompressed_bytes")]
    pub max_total_uncompressed_bytes: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_compression_ratio: default_max_compression_ratio(),
            max_total_uncompressed_bytes: default_max_total_uncompressed_bytes(),
        }
    }
}

/// Output rendition
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Translated EPUB container
    Epub,
    /// Plain text, one block per paragraph
    Text,
    /// Fixed-page text
    Paged,
}

impl OutputFormat {
    /// File extension of the rendition
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Text => "txt",
            Self::Paged => "pages.txt",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "epub" => Ok(Self::Epub),
            "text" | "txt" => Ok(Self::Text),
            "paged" => Ok(Self::Paged),
            _ => Err(anyhow!("Invalid output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// Renditions to produce
    #[serde(default = "default_output_formats")]
    pub formats: Vec<OutputFormat>,

    /// Rename content documents to sanitized file names
    #[serde(default)]
    pub rename_documents: bool,

    /// Characters per line of the paged rendition
    #[serde(default = "default_page_width")]
    pub page_width: usize,

    /// Lines per page of the paged rendition
    #[serde(default = "default_page_lines")]
    pub page_lines: usize,

    /// Treat unresolved segments as a failed run
    #[serde(default)]
    pub fail_on_partial: bool,

    /// Write a JSON job report next to the outputs
    #[serde(default = "default_true")]
    pub write_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: default_output_formats(),
            rename_documents: false,
            page_width: default_page_width(),
            page_lines: default_page_lines(),
            fail_on_partial: false,
            write_report: true,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_max_tokens_per_batch() -> usize {
    3_000
}

fn default_max_segments_per_batch() -> usize {
    25
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_retry_jitter_ms() -> u64 {
    250
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_rate_limit_safety_margin() -> f64 {
    0.9
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_compression_ratio() -> f64 {
    100.0
}

fn default_max_total_uncompressed_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Epub]
}

fn default_page_width() -> usize {
    72
}

fn default_page_lines() -> usize {
    40
}

fn default_true() -> bool {
    true
}

fn default_deepl_endpoint() -> String {
    "https://api.deepl.com/v2".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_lmstudio_endpoint() -> String {
    // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
    "http://localhost:1234/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_lmstudio_model() -> String {
    // Placeholder; users should set to the loaded model name in LM Studio
    "local-model".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional literary translator. Translate the text from {source_language} to {target_language}. Keep every placeholder token such as {TAG_0}, {NUM_1}, {URL_0} or {EMAIL_0} exactly as written, once each, in a natural position. Do not add commentary.".to_string()
}

impl Config {
    /// Load a config file, creating it with defaults when missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            log::warn!("Config file not found at '{}', creating default config.", path.display());
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::get_language_name(&self.source_language)?;
        crate::language_utils::get_language_name(&self.target_language)?;

        for provider in self.translation.provider_chain(&self.target_language) {
            if provider.requires_api_key() && self.translation.get_api_key(provider).is_empty() {
                return Err(anyhow!(
                    "Translation API key is required for {} provider",
                    provider.display_name()
                ));
            }
        }

        for provider in self.translation.provider_chain(&self.target_language) {
            let endpoint = self.translation.get_endpoint(provider);
            parse_endpoint(&endpoint)
                .with_context(|| format!("Invalid endpoint for {} provider", provider.display_name()))?;
        }

        for (language, _) in self.translation.routing.iter() {
            crate::language_utils::validate_language_code(language)
                .with_context(|| format!("Invalid routing entry '{}'", language))?;
        }

        let common = &self.translation.common;
        if common.retry_count == 0 {
            return Err(anyhow!("retry_count must be at least 1"));
        }
        if common.max_concurrent_batches == 0 {
            return Err(anyhow!("max_concurrent_batches must be at least 1"));
        }
        if !(common.rate_limit_safety_margin > 0.0 && common.rate_limit_safety_margin <= 1.0) {
            return Err(anyhow!(
                "rate_limit_safety_margin must be in (0, 1], got {}",
                common.rate_limit_safety_margin
            ));
        }

        if self.container.max_entries == 0 || self.container.max_compression_ratio <= 1.0 {
            return Err(anyhow!("Container limits are too strict to open any EPUB"));
        }

        if self.output.formats.is_empty() {
            return Err(anyhow!("At least one output format is required"));
        }
        if self.output.page_width < 20 || self.output.page_lines < 5 {
            return Err(anyhow!(
                "Page geometry {}x{} is too small",
                self.output.page_width,
                self.output.page_lines
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            translation: TranslationConfig::default(),
            container: ContainerConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Ordered, de-duplicated list of providers for a target language:
    /// pinned (or primary) provider first, then the fallbacks
    pub fn provider_chain(&self, target_language: &str) -> Vec<TranslationProvider> {
        crate::translation::routing::RoutingTable::from_config(self).chain(target_language)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Provider configuration, falling back to built-in defaults
    pub fn resolved_provider_config(&self, provider_type: TranslationProvider) -> ProviderConfig {
        let defaults = ProviderConfig::new(provider_type);
        match self.get_provider_config(provider_type) {
            Some(config) => ProviderConfig {
                model: non_empty_or(&config.model, &defaults.model),
                endpoint: non_empty_or(&config.endpoint, &defaults.endpoint),
                max_tokens_per_batch: if config.max_tokens_per_batch > 0 {
                    config.max_tokens_per_batch
                } else {
                    defaults.max_tokens_per_batch
                },
                max_segments_per_batch: if config.max_segments_per_batch > 0 {
                    config.max_segments_per_batch
                } else {
                    defaults.max_segments_per_batch
                },
                ..config.clone()
            },
            None => defaults,
        }
    }

    /// Get the model for a provider
    pub fn get_model(&self, provider_type: TranslationProvider) -> String {
        self.resolved_provider_config(provider_type).model
    }

    /// Get the API key for a provider
    pub fn get_api_key(&self, provider_type: TranslationProvider) -> String {
        self.get_provider_config(provider_type)
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for a provider
    pub fn get_endpoint(&self, provider_type: TranslationProvider) -> String {
        self.resolved_provider_config(provider_type).endpoint
    }
}

/// Parse an endpoint URL, accepting a bare `host:port` as plain HTTP
pub fn parse_endpoint(endpoint: &str) -> Result<url::Url> {
    if endpoint.is_empty() {
        return Err(anyhow!("Endpoint cannot be empty"));
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        url::Url::parse(endpoint)?
    } else {
        url::Url::parse(&format!("http://{}", endpoint))?
    };

    if url.host_str().is_none() {
        return Err(anyhow!("Invalid host in endpoint: {}", endpoint));
    }
    Ok(url)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            fallback_providers: Vec::new(),
            routing: BTreeMap::new(),
            available_providers: TranslationProvider::ALL
                .iter()
                .map(|p| ProviderConfig::new(*p))
                .collect(),
            common: TranslationCommonConfig::default(),
        }
    }
}
