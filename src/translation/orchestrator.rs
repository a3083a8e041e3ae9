/*!
 * Translation orchestration.
 *
 * Each batch runs its own small state machine:
 *
 * ```text
 * SelectProvider -> DispatchBatch -> Validate -> { RetrySame | Failover | Advance } -> Done | Failed
 * ```
 *
 * - Batches are planned against the first backend of the chain and run with
 *   bounded concurrency. Every dispatch first draws from the shared rate
 *   limiter of its backend.
 * - Transient provider errors retry the same batch with exponential backoff
 *   and jitter, up to `retry_count` attempts per backend.
 * - Segments whose output fails restoration or the quality check are re-sent
 *   right away, under the same attempt ceiling.
 * - Terminal errors, or an exhausted ceiling, move the remaining segments to
 *   the next backend. Each such move counts as one failover.
 * - Segments that fail on every backend come back with `valid == false`.
 *
 * Results are index-aligned with the input segments regardless of the order
 * in which batches complete.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::batch::{Batcher, ProtectedSegment, TranslationBatch};
use super::placeholders::PlaceholderGuard;
use super::rate_limiter::{RateLimiter, RateLimiterRegistry};
use crate::app_config::TranslationCommonConfig;
use crate::errors::{ProviderError, SegmentError, SegmentationError, TranslationError};
use crate::language_utils::{language_class, LanguageClass};
use crate::providers::TranslationBackend;
use crate::segmentation::Segment;

/// Reason attached to segments whose batch never started
pub const CANCELLED_REASON: &str = "cancelled before dispatch";

/// Outcome of one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub segment_index: usize,
    /// Restored translation, or the source text when `valid` is false
    pub translated_text: String,
    /// Backend that produced the accepted translation, empty when none did
    pub provider: String,
    pub valid: bool,
    /// Last failure seen for this segment
    pub reason: Option<String>,
}

/// Counters of one orchestration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationStats {
    pub batches: usize,
    pub requests: usize,
    /// Accepted segments per backend
    pub segments_by_provider: BTreeMap<String, usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Everything the orchestrator learned about a job
#[derive(Debug, Clone, Default)]
pub struct TranslationOutcome {
    /// One result per input segment, in input order
    pub results: Vec<TranslationResult>,
    pub failover_count: usize,
    /// Segments that failed on every backend
    pub failed_segments: Vec<usize>,
    /// Segments skipped because the job was cancelled
    pub cancelled_segments: Vec<usize>,
    pub cancelled: bool,
    pub stats: TranslationStats,
}

impl TranslationOutcome {
    /// Texts to re-inject, index-aligned with the segments
    pub fn translated_texts(&self) -> Vec<String> {
        self.results.iter().map(|r| r.translated_text.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_segments.is_empty()
    }
}

/// Retry and concurrency settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Attempts per backend before failing over
    pub retry_count: u32,
    pub backoff_base: Duration,
    pub jitter_max: Duration,
    pub max_concurrent_batches: usize,
}

impl OrchestratorSettings {
    pub fn from_common(common: &TranslationCommonConfig) -> Self {
        Self {
            retry_count: common.retry_count.max(1),
            backoff_base: Duration::from_millis(common.retry_backoff_ms),
            jitter_max: Duration::from_millis(common.retry_jitter_ms),
            max_concurrent_batches: common.max_concurrent_batches.max(1),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_common(&TranslationCommonConfig::default())
    }
}

/// Backoff before retry number `attempt` (1-based): `base * 2^(attempt - 1)`
/// plus up to `jitter_max` of random jitter
pub fn backoff_delay(base: Duration, jitter_max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let backoff = base.saturating_mul(1u32 << exponent);
    let jitter_ms = jitter_max.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    backoff + Duration::from_millis(jitter)
}

/// Per-batch result before assembly
struct BatchReport {
    results: Vec<(usize, TranslationResult)>,
    failovers: usize,
    requests: usize,
    skipped: bool,
}

/// Drives protected segments through the backend chain
pub struct TranslationOrchestrator {
    backends: Vec<Arc<dyn TranslationBackend>>,
    registry: Arc<RateLimiterRegistry>,
    guard: PlaceholderGuard,
    settings: OrchestratorSettings,
    cancel: Arc<AtomicBool>,
}

impl TranslationOrchestrator {
    /// `backends` is the provider chain in failover order
    pub fn new(
        backends: Vec<Arc<dyn TranslationBackend>>,
        registry: Arc<RateLimiterRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backends,
            registry,
            guard: PlaceholderGuard::new(),
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Mask every segment. `hint_for` supplies per-segment context, typically
    /// the title of the source document.
    pub fn protect_segments<F>(&self, segments: &[Segment], hint_for: F) -> Vec<ProtectedSegment>
    where
        F: Fn(&Segment) -> Option<String>,
    {
        segments
            .iter()
            .map(|segment| {
                let (masked, placeholders) = self.guard.protect(segment);
                ProtectedSegment {
                    index: segment.index,
                    original: segment.text.clone(),
                    masked,
                    placeholders,
                    hint: hint_for(segment),
                }
            })
            .collect()
    }

    /// Translate all segments into `target_language`.
    ///
    /// `on_progress(done, total)` is called after each batch with cumulative
    /// segment counts.
    pub async fn translate<F>(
        &self,
        segments: &[ProtectedSegment],
        target_language: &str,
        on_progress: F,
    ) -> Result<TranslationOutcome, TranslationError>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let primary = self
            .backends
            .first()
            .ok_or_else(|| TranslationError::NoBackend(target_language.to_string()))?;

        let started = Instant::now();
        let total = segments.len();
        let class = language_class(target_language);
        let positions: Vec<usize> = (0..total).collect();
        let batches = Batcher::new(primary.batch_token_limit(), primary.batch_segment_limit()).batches(
            segments,
            &positions,
            primary.name(),
            target_language,
        );
        let batch_count = batches.len();

        info!(
            "Translating {} segments in {} batches (chain: {})",
            total,
            batch_count,
            self.backend_names().join(" -> ")
        );

        let done = AtomicUsize::new(0);
        let done = &done;
        let on_progress = &on_progress;

        let reports: Vec<BatchReport> = stream::iter(batches)
            .map(|batch| async move {
                if self.cancel.load(Ordering::SeqCst) {
                    return Self::skipped(&batch, segments);
                }
                let size = batch.len();
                let report = self.run_batch(&batch, segments, target_language, class).await;
                let so_far = done.fetch_add(size, Ordering::SeqCst) + size;
                on_progress(so_far, total);
                report
            })
            .buffer_unordered(self.settings.max_concurrent_batches.max(1))
            .collect()
            .await;

        let mut slots: Vec<Option<TranslationResult>> = vec![None; total];
        let mut outcome = TranslationOutcome::default();
        outcome.stats.batches = batch_count;

        for report in reports {
            outcome.failover_count += report.failovers;
            outcome.stats.requests += report.requests;
            outcome.cancelled |= report.skipped;
            for (position, result) in report.results {
                if report.skipped {
                    outcome.cancelled_segments.push(result.segment_index);
                } else if !result.valid {
                    outcome.failed_segments.push(result.segment_index);
                } else {
                    *outcome
                        .stats
                        .segments_by_provider
                        .entry(result.provider.clone())
                        .or_insert(0) += 1;
                }
                if let Some(slot) = slots.get_mut(position) {
                    *slot = Some(result);
                }
            }
        }

        let filled = slots.iter().filter(|slot| slot.is_some()).count();
        if filled != total {
            return Err(SegmentationError::Mismatch {
                stage: "translate".to_string(),
                segments: total,
                entries: filled,
            }
            .into());
        }

        outcome.results = slots.into_iter().flatten().collect();
        outcome.failed_segments.sort_unstable();
        outcome.cancelled_segments.sort_unstable();
        outcome.stats.elapsed = started.elapsed();

        if outcome.cancelled {
            warn!(
                "Translation cancelled: {} segments were not dispatched",
                outcome.cancelled_segments.len()
            );
        }
        if !outcome.failed_segments.is_empty() {
            warn!(
                "{} segments failed on every backend: {:?}",
                outcome.failed_segments.len(),
                outcome.failed_segments
            );
        }
        info!(
            "Translation finished in {:.1}s: {} requests, {} failovers",
            outcome.stats.elapsed.as_secs_f64(),
            outcome.stats.requests,
            outcome.failover_count
        );

        Ok(outcome)
    }

    fn skipped(batch: &TranslationBatch, segments: &[ProtectedSegment]) -> BatchReport {
        BatchReport {
            results: batch
                .segments
                .iter()
                .map(|&position| {
                    let segment = &segments[position];
                    (
                        position,
                        TranslationResult {
                            segment_index: segment.index,
                            translated_text: segment.original.clone(),
                            provider: String::new(),
                            valid: false,
                            reason: Some(CANCELLED_REASON.to_string()),
                        },
                    )
                })
                .collect(),
            failovers: 0,
            requests: 0,
            skipped: true,
        }
    }

    async fn run_batch(
        &self,
        batch: &TranslationBatch,
        segments: &[ProtectedSegment],
        target_language: &str,
        class: LanguageClass,
    ) -> BatchReport {
        let mut pending = batch.segments.clone();
        let mut results = Vec::with_capacity(pending.len());
        let mut reasons: HashMap<usize, String> = HashMap::new();
        let mut failovers = 0;
        let mut requests = 0;

        for (chain_position, backend) in self.backends.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            if chain_position > 0 {
                failovers += 1;
                warn!(
                    "Failing over {} segments from {} to {}",
                    pending.len(),
                    self.backends[chain_position - 1].name(),
                    backend.name()
                );
            }

            let limiter = self.registry.limiter_for(backend.name(), backend.rate_limits());
            let sub_batches = Batcher::new(backend.batch_token_limit(), backend.batch_segment_limit())
                .batches(segments, &pending, backend.name(), target_language);

            let mut still_pending = Vec::new();
            for sub_batch in sub_batches {
                let (accepted, leftover, sent) = self
                    .dispatch(backend.as_ref(), &limiter, &sub_batch, segments, class)
                    .await;
                requests += sent;
                results.extend(accepted);
                for (position, reason) in leftover {
                    reasons.insert(position, reason);
                    still_pending.push(position);
                }
            }
            pending = still_pending;
        }

        for position in pending {
            let segment = &segments[position];
            results.push((
                position,
                TranslationResult {
                    segment_index: segment.index,
                    translated_text: segment.original.clone(),
                    provider: String::new(),
                    valid: false,
                    reason: reasons.remove(&position),
                },
            ));
        }

        BatchReport {
            results,
            failovers,
            requests,
            skipped: false,
        }
    }

    /// Run one batch against one backend until every segment is accepted or
    /// the attempt ceiling is hit. Returns accepted results, the segments
    /// still failing with their last reason, and the number of requests sent.
    async fn dispatch(
        &self,
        backend: &dyn TranslationBackend,
        limiter: &RateLimiter,
        batch: &TranslationBatch,
        segments: &[ProtectedSegment],
        class: LanguageClass,
    ) -> (Vec<(usize, TranslationResult)>, Vec<(usize, String)>, usize) {
        let mut pending = batch.segments.clone();
        let mut accepted = Vec::new();
        let mut failures: HashMap<usize, String> = HashMap::new();
        let mut attempt = 0u32;

        while !pending.is_empty() && attempt < self.settings.retry_count {
            attempt += 1;

            let texts: Vec<String> = pending.iter().map(|&p| segments[p].masked.clone()).collect();
            let tokens: usize = pending.iter().map(|&p| segments[p].estimated_tokens()).sum();
            let hint = shared_hint(segments, &pending);

            limiter.acquire(tokens).await;
            debug!(
                "{}: attempt {} with {} segments (~{} tokens)",
                backend.name(),
                attempt,
                texts.len(),
                tokens
            );

            let error = match backend.translate(&texts, &batch.target_language, hint).await {
                Ok(outputs) if outputs.len() == texts.len() => {
                    let mut invalid = Vec::new();
                    for (&position, output) in pending.iter().zip(outputs) {
                        match self.validate(&segments[position], &output, class) {
                            Ok(text) => {
                                failures.remove(&position);
                                accepted.push((
                                    position,
                                    TranslationResult {
                                        segment_index: segments[position].index,
                                        translated_text: text,
                                        provider: backend.name().to_string(),
                                        valid: true,
                                        reason: None,
                                    },
                                ));
                            }
                            Err(e) => {
                                debug!("{}: {}", backend.name(), e);
                                failures.insert(position, e.to_string());
                                invalid.push(position);
                            }
                        }
                    }
                    pending = invalid;
                    continue;
                }
                Ok(outputs) => ProviderError::BatchMismatch {
                    sent: texts.len(),
                    received: outputs.len(),
                },
                Err(e) => e,
            };

            for &position in &pending {
                failures.insert(position, error.to_string());
            }

            if !error.is_transient() {
                warn!("{}: terminal error, giving up on backend: {}", backend.name(), error);
                break;
            }

            if attempt < self.settings.retry_count {
                let mut delay = backoff_delay(self.settings.backoff_base, self.settings.jitter_max, attempt);
                if let ProviderError::RateLimitExceeded {
                    retry_after_secs: Some(secs),
                    ..
                } = &error
                {
                    delay = delay.max(Duration::from_secs(*secs));
                }
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    backend.name(),
                    attempt,
                    self.settings.retry_count,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        let leftover = pending
            .into_iter()
            .map(|position| {
                let reason = failures
                    .remove(&position)
                    .unwrap_or_else(|| "attempt ceiling reached".to_string());
                (position, reason)
            })
            .collect();

        (accepted, leftover, attempt as usize)
    }

    fn validate(
        &self,
        segment: &ProtectedSegment,
        output: &str,
        class: LanguageClass,
    ) -> Result<String, SegmentError> {
        let restored = self.guard.restore(output, &segment.placeholders)?;
        self.guard
            .check_quality(segment.index, &segment.original, &restored, class)?;
        Ok(restored)
    }
}

/// Context hint common to every pending segment, if there is one
fn shared_hint<'a>(segments: &'a [ProtectedSegment], pending: &[usize]) -> Option<&'a str> {
    let (&first, rest) = pending.split_first()?;
    let hint = segments[first].hint.as_deref()?;
    rest.iter()
        .all(|&p| segments[p].hint.as_deref() == Some(hint))
        .then_some(hint)
}
