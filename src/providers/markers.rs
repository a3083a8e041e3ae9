/*!
 * Entry markers for packing a batch into one LLM prompt.
 *
 * A batch of N strings is sent as:
 *
 * ```text
 * <<ENTRY_0>>
 * first text
 * <<ENTRY_1>>
 * second text
 * <<END>>
 * ```
 *
 * and the model is asked to answer in the same shape. Splitting the reply
 * requires every marker, in order, plus the end marker; anything else is a
 * `BatchMismatch` so the orchestrator retries the batch.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ProviderError;

static ENTRY_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<<ENTRY_(\d+)>>").expect("Invalid entry marker regex")
});

/// End marker constant
pub const END_MARKER: &str = "<<END>>";

/// Instructions appended to the system prompt of marker-based backends
pub const MARKER_INSTRUCTIONS: &str = "The input contains numbered entries delimited by <<ENTRY_n>> markers and terminated by <<END>>. Translate each entry separately and answer with the same markers, in the same order, followed by <<END>>. Output nothing else.";

/// Pack a batch into marker-delimited text
pub fn pack(batch: &[String]) -> String {
    let mut packed = String::new();
    for (index, text) in batch.iter().enumerate() {
        packed.push_str(&format!("<<ENTRY_{}>>\n{}\n", index, text));
    }
    packed.push_str(END_MARKER);
    packed
}

/// Split a marker-delimited reply into exactly `expected` entries
pub fn split(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    if expected == 0 {
        return Ok(Vec::new());
    }

    let markers: Vec<(usize, usize, usize)> = ENTRY_MARKER_REGEX
        .captures_iter(response)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let index = cap.get(1)?.as_str().parse().ok()?;
            Some((index, whole.start(), whole.end()))
        })
        .collect();

    let found: Vec<usize> = markers.iter().map(|(index, _, _)| *index).collect();
    let in_order = found.iter().copied().eq(0..expected);
    if !in_order {
        debug!(
            "Marker mismatch: expected 0..{}, found {:?}",
            expected, found
        );
        return Err(ProviderError::BatchMismatch {
            sent: expected,
            received: found.len(),
        });
    }

    let end_position = response.rfind(END_MARKER);
    let mut entries = Vec::with_capacity(expected);
    for (position, (_, _, content_start)) in markers.iter().enumerate() {
        let content_end = match markers.get(position + 1) {
            Some((_, next_start, _)) => *next_start,
            None => match end_position {
                Some(end) if end >= *content_start => end,
                // Missing <<END>>: the reply was probably cut off
                _ => {
                    return Err(ProviderError::BatchMismatch {
                        sent: expected,
                        received: expected - 1,
                    });
                }
            },
        };
        entries.push(response[*content_start..content_end].trim().to_string());
    }

    Ok(entries)
}
