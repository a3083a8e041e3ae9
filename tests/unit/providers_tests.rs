/*!
 * Tests for the backend factory and HTTP backend failure classification
 */

use epubwai::app_config::{ProviderConfig, TranslationConfig, TranslationProvider};
use epubwai::errors::ProviderError;
use epubwai::providers::{RateLimits, create_backend, markers};

fn translation_config(providers: Vec<ProviderConfig>) -> TranslationConfig {
    TranslationConfig {
        available_providers: providers,
        ..TranslationConfig::default()
    }
}

#[test]
fn test_createBackend_shouldNameEachProvider() {
    let config = translation_config(Vec::new());
    let cases = [
        (TranslationProvider::DeepL, "deepl"),
        (TranslationProvider::OpenAI, "openai"),
        (TranslationProvider::Anthropic, "anthropic"),
        (TranslationProvider::Ollama, "ollama"),
        (TranslationProvider::LMStudio, "lmstudio"),
    ];

    for (provider, name) in cases {
        let backend = create_backend(provider, &config, "en");
        assert_eq!(backend.name(), name);
    }
}

#[test]
fn test_createBackend_shouldCarryConfiguredLimits() {
    let mut anthropic = ProviderConfig::new(TranslationProvider::Anthropic);
    anthropic.max_tokens_per_batch = 900;
    anthropic.max_segments_per_batch = 7;
    anthropic.requests_per_minute = Some(12);
    let config = translation_config(vec![anthropic]);

    let backend = create_backend(TranslationProvider::Anthropic, &config, "en");

    assert_eq!(backend.batch_token_limit(), 900);
    assert_eq!(backend.batch_segment_limit(), 7);
    assert_eq!(
        backend.rate_limits(),
        RateLimits {
            requests_per_minute: Some(12),
            tokens_per_minute: Some(40_000),
        }
    );
}

#[test]
fn test_createBackend_withUnconfiguredProvider_shouldUseDefaults() {
    let config = translation_config(Vec::new());

    let deepl = create_backend(TranslationProvider::DeepL, &config, "en");
    assert_eq!(deepl.batch_segment_limit(), 50);
    assert_eq!(deepl.rate_limits().requests_per_minute, Some(60));

    let ollama = create_backend(TranslationProvider::Ollama, &config, "en");
    assert_eq!(ollama.batch_token_limit(), 1_500);
    assert_eq!(ollama.rate_limits(), RateLimits::unlimited());
}

#[tokio::test]
async fn test_translate_withUnreachableServer_shouldReportTransientError() {
    let mut ollama = ProviderConfig::new(TranslationProvider::Ollama);
    ollama.endpoint = "http://127.0.0.1:1".to_string();
    ollama.timeout_secs = 2;
    let config = translation_config(vec![ollama]);
    let backend = create_backend(TranslationProvider::Ollama, &config, "en");

    let batch = vec!["Hello".to_string()];
    let error = backend.translate(&batch, "fr", None).await.unwrap_err();

    assert!(
        matches!(error, ProviderError::ConnectionError(_) | ProviderError::Timeout(_) | ProviderError::RequestFailed(_)),
        "unexpected error: {error:?}"
    );
    assert!(error.is_transient());
}

#[test]
fn test_markers_packThenSplit_shouldPreserveOrder() {
    let batch = vec![
        "First line.".to_string(),
        "Second {NUM_0} line.".to_string(),
        String::new(),
    ];
    let packed = markers::pack(&batch);
    assert_eq!(markers::split(&packed, batch.len()).unwrap(), batch);
}
