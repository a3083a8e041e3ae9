/*!
 * Segmentation and reconstruction of content documents.
 *
 * `Segmenter::segment` walks every document in a fixed order and extracts
 * maximal runs of inline content as flat, index-ordered `Segment`s. For each
 * segment it stamps a `ReconstructionEntry` holding the run's address (path
 * to the parent element plus the child range) and the whitespace trimmed off
 * its edges. `Segmenter::reconstruct` replays those addresses in reverse
 * document order and never re-derives them from the tag tables.
 *
 * The segment list and the reconstruction map are index-aligned; any length
 * disagreement is a `SegmentationError`.
 */

pub mod reconstruct;
pub mod rules;
pub mod segmenter;

use serde::{Deserialize, Serialize};

use crate::errors::SegmentationError;
use crate::markup::NodePath;

pub use segmenter::Segmenter;

/// A translatable unit of text extracted from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the job-wide segment list
    pub index: usize,
    /// Serialized inline fragment, trimmed
    pub text: String,
    /// Id of the document the segment came from
    pub source_document_id: String,
    /// Path to the element holding the run
    pub node_path: NodePath,
}

/// Address and edge whitespace of one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionEntry {
    pub document_id: String,
    /// Path to the parent element of the run
    pub node_path: NodePath,
    /// First child index of the run
    pub start: usize,
    /// One past the last child index of the run
    pub end: usize,
    pub leading_whitespace: String,
    pub trailing_whitespace: String,
    /// The run is the text of a `title` or heading element
    pub title_bearing: bool,
}

/// Reconstruction entries, index-aligned with the segment list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionMap {
    pub entries: Vec<ReconstructionEntry>,
}

impl ReconstructionMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReconstructionEntry> {
        self.entries.get(index)
    }

    /// Check that a list produced at `stage` still lines up with the map
    pub fn check_alignment(&self, stage: &str, items: usize) -> Result<(), SegmentationError> {
        if self.entries.len() != items {
            return Err(SegmentationError::Mismatch {
                stage: stage.to_string(),
                segments: items,
                entries: self.entries.len(),
            });
        }
        Ok(())
    }
}
