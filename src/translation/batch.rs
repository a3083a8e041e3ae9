/*!
 * Batch planning.
 *
 * Consecutive protected segments are grouped into batches that respect the
 * backend's token budget and segment ceiling. A segment that alone exceeds
 * the token budget travels in a batch of its own.
 */

use serde::Serialize;

use crate::providers::estimate_tokens;

/// One masked segment ready to be sent to a backend
#[derive(Debug, Clone)]
pub struct ProtectedSegment {
    /// Position in the job's segment list
    pub index: usize,
    /// Segment text before masking
    pub original: String,
    /// Masked text sent to the backend
    pub masked: String,
    pub placeholders: super::placeholders::PlaceholderMap,
    /// Context passed along with the batch, typically the document title
    pub hint: Option<String>,
}

impl ProtectedSegment {
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.masked)
    }
}

/// A group of segments sent in one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationBatch {
    /// Segment indices, in document order
    pub segments: Vec<usize>,
    pub provider: String,
    pub target_language: String,
    pub estimated_tokens: usize,
}

impl TranslationBatch {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Groups segments under per-backend limits
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    token_limit: usize,
    segment_limit: usize,
}

impl Batcher {
    pub fn new(token_limit: usize, segment_limit: usize) -> Self {
        Self {
            token_limit: token_limit.max(1),
            segment_limit: segment_limit.max(1),
        }
    }

    /// Split `(segment index, token estimate)` pairs into consecutive groups
    pub fn plan(&self, items: &[(usize, usize)]) -> Vec<(Vec<usize>, usize)> {
        let mut groups = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0usize;

        for &(index, tokens) in items {
            let over_tokens = current_tokens + tokens > self.token_limit;
            let over_count = current.len() >= self.segment_limit;
            if !current.is_empty() && (over_tokens || over_count) {
                groups.push((std::mem::take(&mut current), current_tokens));
                current_tokens = 0;
            }
            current.push(index);
            current_tokens += tokens;
        }

        if !current.is_empty() {
            groups.push((current, current_tokens));
        }
        groups
    }

    /// Plan batches for `segments`, selected by position in `pool`
    pub fn batches(
        &self,
        pool: &[ProtectedSegment],
        positions: &[usize],
        provider: &str,
        target_language: &str,
    ) -> Vec<TranslationBatch> {
        let items: Vec<(usize, usize)> = positions
            .iter()
            .map(|&position| (position, pool[position].estimated_tokens()))
            .collect();

        self.plan(&items)
            .into_iter()
            .map(|(segments, estimated_tokens)| TranslationBatch {
                segments,
                provider: provider.to_string(),
                target_language: target_language.to_string(),
                estimated_tokens,
            })
            .collect()
    }
}
