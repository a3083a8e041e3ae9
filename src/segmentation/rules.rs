/*!
 * Tag tables driving segmentation.
 *
 * Only the segmenter consults these; reconstruction replays recorded
 * addresses instead.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Phrasing elements that stay inside a run and are translated with it
pub const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "big", "cite", "data", "del", "dfn", "em", "font", "i", "ins",
    "label", "mark", "q", "rb", "rp", "rt", "ruby", "s", "small", "span", "strike", "strong", "sub",
    "sup", "time", "tt", "u", "wbr",
];

/// Inline elements kept inside a run but never translated (masked whole)
pub const ATOMIC_INLINE_TAGS: &[&str] = &[
    "audio", "br", "code", "embed", "iframe", "img", "input", "kbd", "math", "object", "samp",
    "svg", "var", "video",
];

/// Elements whose whole subtree is left untouched
pub const VERBATIM_TAGS: &[&str] = &[
    "pre", "script", "style", "textarea", "template", "noscript", "svg", "math", "code",
];

/// Elements whose runs label a document or section
pub const TITLE_BEARING_TAGS: &[&str] = &["title", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Minimum visible length for runs without alphabetic content
pub const MIN_SEGMENT_CHARS: usize = 3;

static STRAY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</?[A-Za-z][\w:.-]*(\s[^<>]*)?/?>$").unwrap());

static NUMERIC_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s.,:;/+\-\u{2013}\u{2014}%()#]+$").unwrap());

/// Classification of an element for the traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRole {
    /// Part of a run, translated
    Inline,
    /// Part of a run, masked whole
    AtomicInline,
    /// Separates runs, skipped entirely
    Verbatim,
    /// Separates runs, its own children are walked
    Container,
}

/// Role of an element given its lowercased local name
pub fn tag_role(local_name: &str) -> TagRole {
    if ATOMIC_INLINE_TAGS.contains(&local_name) {
        TagRole::AtomicInline
    } else if INLINE_TAGS.contains(&local_name) {
        TagRole::Inline
    } else if VERBATIM_TAGS.contains(&local_name) {
        TagRole::Verbatim
    } else {
        TagRole::Container
    }
}

pub fn is_title_bearing(local_name: &str) -> bool {
    TITLE_BEARING_TAGS.contains(&local_name)
}

/// Whether a run with this visible text is worth translating
pub fn is_translatable(visible_text: &str) -> bool {
    let trimmed = visible_text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if NUMERIC_ONLY.is_match(trimmed) && trimmed.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if STRAY_TAG.is_match(trimmed) {
        return false;
    }
    let has_alphabetic = trimmed.chars().any(char::is_alphabetic);
    if !has_alphabetic && trimmed.chars().count() < MIN_SEGMENT_CHARS {
        return false;
    }
    true
}
