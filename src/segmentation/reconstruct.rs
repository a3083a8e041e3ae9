use std::collections::HashMap;

use log::debug;

use super::segmenter::visible_text;
use super::{ReconstructionEntry, ReconstructionMap, Segment, Segmenter};
use crate::document::{normalize_whitespace, Document};
use crate::errors::SegmentationError;
use crate::markup::{parse_fragment, Node};

/// Original and translated text of a title-bearing segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleTranslation {
    pub document_id: String,
    pub original: String,
    pub translated: String,
}

impl Segmenter {
    /// Re-inject translated fragments at the recorded addresses.
    ///
    /// Entries are replayed in reverse document order so a replacement never
    /// shifts an address that is still pending.
    pub fn reconstruct(
        &self,
        documents: &mut [Document],
        map: &ReconstructionMap,
        translated_segments: &[String],
    ) -> Result<(), SegmentationError> {
        map.check_alignment("reconstruct", translated_segments.len())?;

        let positions: HashMap<String, usize> = documents
            .iter()
            .enumerate()
            .map(|(position, document)| (document.id.clone(), position))
            .collect();

        let mut order: Vec<(usize, Vec<usize>, usize)> = Vec::with_capacity(map.len());
        for (index, entry) in map.entries.iter().enumerate() {
            let position = *positions.get(&entry.document_id).ok_or_else(|| {
                SegmentationError::Reconstruction {
                    segment_index: index,
                    reason: format!("unknown document '{}'", entry.document_id),
                }
            })?;
            let mut key = entry.node_path.0.clone();
            key.push(entry.start);
            order.push((position, key, index));
        }
        order.sort();

        for (position, _, index) in order.into_iter().rev() {
            let entry = &map.entries[index];
            replace_run(&mut documents[position], entry, &translated_segments[index], index)?;
        }

        for document in documents.iter_mut() {
            document.refresh_title();
        }
        debug!("Reconstructed {} segments", map.len());
        Ok(())
    }
}

fn replace_run(
    document: &mut Document,
    entry: &ReconstructionEntry,
    fragment: &str,
    segment_index: usize,
) -> Result<(), SegmentationError> {
    let parsed = parse_fragment(fragment).map_err(|e| SegmentationError::Reconstruction {
        segment_index,
        reason: format!("fragment is not well-formed: {}", e),
    })?;

    let parent = document
        .markup
        .element_at_mut(&entry.node_path)
        .ok_or_else(|| SegmentationError::Reconstruction {
            segment_index,
            reason: format!(
                "address {} no longer resolves in {}",
                entry.node_path, document.path
            ),
        })?;

    if entry.start > entry.end || entry.end > parent.children.len() {
        return Err(SegmentationError::Reconstruction {
            segment_index,
            reason: format!(
                "child range {}..{} out of bounds ({} children) at {}",
                entry.start,
                entry.end,
                parent.children.len(),
                entry.node_path
            ),
        });
    }

    let mut replacement = Vec::with_capacity(parsed.len() + 2);
    if !entry.leading_whitespace.is_empty() {
        replacement.push(Node::Text(entry.leading_whitespace.clone()));
    }
    replacement.extend(parsed);
    if !entry.trailing_whitespace.is_empty() {
        replacement.push(Node::Text(entry.trailing_whitespace.clone()));
    }

    parent
        .children
        .splice(entry.start..entry.end, merge_adjacent_text(replacement));
    Ok(())
}

fn merge_adjacent_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match (merged.last_mut(), node) {
            (Some(Node::Text(previous)), Node::Text(text)) => previous.push_str(&text),
            (_, node) => merged.push(node),
        }
    }
    merged
}

/// Pairs of original/translated visible text for title-bearing segments
pub fn title_translations(
    segments: &[Segment],
    map: &ReconstructionMap,
    translated_segments: &[String],
) -> Vec<TitleTranslation> {
    segments
        .iter()
        .zip(map.entries.iter())
        .zip(translated_segments.iter())
        .filter(|((_, entry), _)| entry.title_bearing)
        .filter_map(|((segment, entry), translated)| {
            let original = normalize_whitespace(&visible_text(&parse_fragment(&segment.text).ok()?));
            let translated = normalize_whitespace(&visible_text(&parse_fragment(translated).ok()?));
            if original.is_empty() || translated.is_empty() || original == translated {
                return None;
            }
            Some(TitleTranslation {
                document_id: entry.document_id.clone(),
                original,
                translated,
            })
        })
        .collect()
}
