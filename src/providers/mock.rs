/*!
 * Mock backend implementations for testing.
 *
 * This module provides a scripted backend that simulates different behaviors:
 * - `MockBackend::echo()` - Returns its input unchanged
 * - `MockBackend::prefixed()` - Prepends a marker to every string
 * - `MockBackend::failing()` - Always fails with the given error
 * - `MockBackend::flaky()` - Fails a fixed number of times, then echoes
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{RateLimits, TranslationBackend};
use crate::errors::ProviderError;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[A-Z]+_\d+\}").unwrap());

/// Behavior mode for the mock backend
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Returns every string unchanged
    Echo,
    /// Prepends a fixed prefix to every string
    Prefix(String),
    /// Applies a function to every string
    Map(fn(&str) -> String),
    /// Always fails with an error
    Failing(ProviderError),
    /// Fails the first `failures` calls, echoes afterwards
    FailFirst { failures: usize, error: ProviderError },
    /// Strips every placeholder token from its output
    DropTokens,
    /// Returns one string fewer than it was sent
    ShortBatch,
}

/// Mock backend for testing translation behavior
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    behavior: MockBehavior,
    rate_limits: RateLimits,
    token_limit: usize,
    segment_limit: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    received: Mutex<Vec<Vec<String>>>,
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            rate_limits: RateLimits::unlimited(),
            token_limit: 1_000,
            segment_limit: 10,
            delay: None,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn echo(name: &str) -> Self {
        Self::new(name, MockBehavior::Echo)
    }

    pub fn prefixed(name: &str, prefix: &str) -> Self {
        Self::new(name, MockBehavior::Prefix(prefix.to_string()))
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::new(name, MockBehavior::Failing(error))
    }

    pub fn flaky(name: &str, failures: usize, error: ProviderError) -> Self {
        Self::new(name, MockBehavior::FailFirst { failures, error })
    }

    pub fn with_batch_limits(mut self, token_limit: usize, segment_limit: usize) -> Self {
        self.token_limit = token_limit;
        self.segment_limit = segment_limit;
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Sleep before answering, to widen concurrency windows in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `translate` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every batch received, in call order
    pub fn received_batches(&self) -> Vec<Vec<String>> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_token_limit(&self) -> usize {
        self.token_limit
    }

    fn batch_segment_limit(&self) -> usize {
        self.segment_limit
    }

    fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }

    async fn translate(
        &self,
        batch: &[String],
        _target_language: &str,
        _hint: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().push(batch.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Echo => Ok(batch.to_vec()),
            MockBehavior::Prefix(prefix) => Ok(batch.iter().map(|s| format!("{}{}", prefix, s)).collect()),
            MockBehavior::Map(transform) => Ok(batch.iter().map(|s| transform(s)).collect()),
            MockBehavior::Failing(error) => Err(error.clone()),
            MockBehavior::FailFirst { failures, error } => {
                if call < *failures {
                    Err(error.clone())
                } else {
                    Ok(batch.to_vec())
                }
            }
            MockBehavior::DropTokens => Ok(batch
                .iter()
                .map(|s| TOKEN.replace_all(s, "").into_owned())
                .collect()),
            MockBehavior::ShortBatch => Ok(batch.iter().skip(1).cloned().collect()),
        }
    }
}
