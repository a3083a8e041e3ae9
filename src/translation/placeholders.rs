/*!
 * Placeholder protection for segment text.
 *
 * Before a segment is sent to a backend, everything that must survive
 * translation byte-for-byte is replaced by a brace token:
 *
 * 1. markup: comments, CDATA, atomic inline elements (whole), remaining
 *    tags, literal text that already looks like a token
 * 2. absolute URLs, including `&amp;`-escaped query separators
 * 3. entity references
 * 4. e-mail addresses
 * 5. numeric literals
 *
 * Passes run in that order and later passes only look at text between the
 * tokens produced so far. Restoration requires every token exactly once and
 * rejects near-miss spellings such as `{ NUM_0 }`.
 */

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::SegmentError;
use crate::language_utils::LanguageClass;
use crate::markup::parse_fragment;
use crate::segmentation::rules::ATOMIC_INLINE_TAGS;
use crate::segmentation::Segment;

/// Sources shorter than this many visible characters skip the ratio check
pub const MIN_CHARS_FOR_RATIO: usize = 10;

/// Kind of protected content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceholderKind {
    Tag,
    Number,
    Url,
    Email,
}

impl PlaceholderKind {
    pub const ALL: [PlaceholderKind; 4] = [Self::Tag, Self::Number, Self::Url, Self::Email];

    /// Label used inside the token
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tag => "TAG",
            Self::Number => "NUM",
            Self::Url => "URL",
            Self::Email => "EMAIL",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

/// One masked span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderToken {
    pub kind: PlaceholderKind,
    /// Index within the kind, per segment
    pub index: usize,
    /// Text the token stands for
    pub original_value: String,
}

impl PlaceholderToken {
    /// The token as it appears in masked text, e.g. `{NUM_0}`
    pub fn token(&self) -> String {
        format!("{{{}_{}}}", self.kind.label(), self.index)
    }
}

impl fmt::Display for PlaceholderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}_{}}}", self.kind.label(), self.index)
    }
}

/// All tokens of one segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderMap {
    pub segment_index: usize,
    pub tokens: Vec<PlaceholderToken>,
}

impl PlaceholderMap {
    /// Number of tokens of a kind
    pub fn count(&self, kind: PlaceholderKind) -> usize {
        self.tokens.iter().filter(|t| t.kind == kind).count()
    }

    fn lookup(&self, kind: PlaceholderKind, index: usize) -> Option<&PlaceholderToken> {
        self.tokens.iter().find(|t| t.kind == kind && t.index == index)
    }
}

static COMMENT_OR_CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>").unwrap());

// Atomic elements are matched one tag name at a time so an opening tag only
// pairs with its own closing tag
static ATOMIC_ELEMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ATOMIC_INLINE_TAGS
        .iter()
        .map(|name| {
            Regex::new(&format!(
                r#"(?s)<(?:[\w-]+:)?{name}\b(?:"[^"]*"|'[^']*'|[^'">])*?(?:/>|>.*?</(?:[\w-]+:)?{name}\s*>)"#
            ))
            .unwrap()
        })
        .collect()
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"</?[A-Za-z][^<>"']*(?:(?:"[^"]*"|'[^']*')[^<>"']*)*>"#).unwrap());

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:#\d+|#[xX][0-9A-Fa-f]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

static ENTITY_AT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&(?:#\d+|#[xX][0-9A-Fa-f]+|[A-Za-z][A-Za-z0-9]*);").unwrap());

// Anything brace-delimited that resembles a token, including near misses
static LOOSE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*([A-Za-z]+)\s*_\s*(\d+)\s*\}").unwrap());

static STRICT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{(TAG|NUM|URL|EMAIL)_(0|[1-9]\d*)\}$").unwrap());

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"'{}]+"#).unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}").unwrap());

// Escaped ampersands that may appear inside a URL's query string
const AMPERSAND_ENTITIES: [&str; 4] = ["&amp;", "&#38;", "&#x26;", "&#X26;"];

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:[.,]\d+)*\b").unwrap());

enum Chunk {
    Text(String),
    Token(String),
}

/// Splits text chunks around matches and registers one token per match
struct Masker {
    segment_index: usize,
    chunks: Vec<Chunk>,
    tokens: Vec<PlaceholderToken>,
    counters: HashMap<PlaceholderKind, usize>,
}

impl Masker {
    fn new(segment_index: usize, text: &str) -> Self {
        Self {
            segment_index,
            chunks: vec![Chunk::Text(text.to_string())],
            tokens: Vec::new(),
            counters: HashMap::new(),
        }
    }

    fn mask<F>(&mut self, kind: PlaceholderKind, find: F)
    where
        F: Fn(&str) -> Vec<(usize, usize)>,
    {
        let chunks = std::mem::take(&mut self.chunks);
        for chunk in chunks {
            let text = match chunk {
                Chunk::Text(text) => text,
                token => {
                    self.chunks.push(token);
                    continue;
                }
            };

            let mut last = 0;
            for (start, end) in find(&text) {
                if start > last {
                    self.chunks.push(Chunk::Text(text[last..start].to_string()));
                }
                let token = self.register(kind, &text[start..end]);
                self.chunks.push(Chunk::Token(token));
                last = end;
            }
            if last < text.len() {
                self.chunks.push(Chunk::Text(text[last..].to_string()));
            }
        }
    }

    fn mask_regex(&mut self, kind: PlaceholderKind, regex: &Regex) {
        self.mask(kind, |text| regex.find_iter(text).map(|m| (m.start(), m.end())).collect());
    }

    fn register(&mut self, kind: PlaceholderKind, value: &str) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        let token = PlaceholderToken {
            kind,
            index: *counter,
            original_value: value.to_string(),
        };
        *counter += 1;
        let rendered = token.token();
        self.tokens.push(token);
        rendered
    }

    fn finish(self) -> (String, PlaceholderMap) {
        let mut masked = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) | Chunk::Token(text) => masked.push_str(text),
            }
        }
        (
            masked,
            PlaceholderMap {
                segment_index: self.segment_index,
                tokens: self.tokens,
            },
        )
    }
}

/// Whole atomic elements, leftmost first
fn atomic_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut position = 0;
    while position < text.len() {
        let next = ATOMIC_ELEMENTS
            .iter()
            .filter_map(|regex| regex.find_at(text, position))
            .min_by_key(|m| (m.start(), std::cmp::Reverse(m.end())));
        match next {
            Some(m) => {
                spans.push((m.start(), m.end()));
                position = m.end();
            }
            None => break,
        }
    }
    spans
}

/// URL spans without trailing sentence punctuation. An escaped ampersand
/// stays part of the URL, any other entity reference ends it.
fn url_spans(text: &str) -> Vec<(usize, usize)> {
    URL.find_iter(text)
        .filter_map(|m| {
            let candidate = m.as_str();
            let cut = ENTITY
                .find_iter(candidate)
                .find(|entity| !AMPERSAND_ENTITIES.contains(&entity.as_str()))
                .map_or(candidate.len(), |entity| entity.start());
            let trimmed = trim_url_end(&candidate[..cut]);
            let end = m.start() + trimmed.len();
            // Scheme alone is not a URL
            (trimmed.len() > "https://".len()).then_some((m.start(), end))
        })
        .collect()
}

fn trim_url_end(url: &str) -> &str {
    let mut trimmed = url;
    loop {
        if let Some(rest) = AMPERSAND_ENTITIES
            .iter()
            .find_map(|entity| trimmed.strip_suffix(*entity))
        {
            trimmed = rest;
        } else if let Some(rest) =
            trimmed.strip_suffix(['.', ',', ';', ':', '!', '?', ')', ']', '\''])
        {
            trimmed = rest;
        } else {
            return trimmed;
        }
    }
}

/// Masks, restores and validates segment text
#[derive(Debug, Clone, Default)]
pub struct PlaceholderGuard;

impl PlaceholderGuard {
    pub fn new() -> Self {
        Self
    }

    /// Mask a segment's protected spans
    pub fn protect(&self, segment: &Segment) -> (String, PlaceholderMap) {
        self.protect_text(segment.index, &segment.text)
    }

    /// Mask protected spans of arbitrary text
    pub fn protect_text(&self, segment_index: usize, text: &str) -> (String, PlaceholderMap) {
        let mut masker = Masker::new(segment_index, text);

        masker.mask_regex(PlaceholderKind::Tag, &COMMENT_OR_CDATA);
        masker.mask(PlaceholderKind::Tag, atomic_spans);
        masker.mask_regex(PlaceholderKind::Tag, &TAG);
        masker.mask_regex(PlaceholderKind::Tag, &LOOSE_TOKEN);
        masker.mask(PlaceholderKind::Url, url_spans);
        masker.mask_regex(PlaceholderKind::Tag, &ENTITY);
        masker.mask_regex(PlaceholderKind::Email, &EMAIL);
        masker.mask_regex(PlaceholderKind::Number, &NUMBER);

        masker.finish()
    }

    /// Put the original spans back into a translated, masked text.
    ///
    /// Fails when a token is missing, duplicated, unknown or misspelled, or
    /// when the restored fragment is not well-formed markup.
    pub fn restore(&self, masked_text: &str, map: &PlaceholderMap) -> Result<String, SegmentError> {
        let integrity = |reason: String| SegmentError::PlaceholderIntegrity {
            segment_index: map.segment_index,
            reason,
        };

        let mut seen: HashMap<(PlaceholderKind, usize), usize> = HashMap::new();
        for found in LOOSE_TOKEN.find_iter(masked_text) {
            let captures = STRICT_TOKEN
                .captures(found.as_str())
                .ok_or_else(|| integrity(format!("malformed token '{}'", found.as_str())))?;
            let kind = PlaceholderKind::from_label(&captures[1])
                .ok_or_else(|| integrity(format!("malformed token '{}'", found.as_str())))?;
            let index: usize = captures[2]
                .parse()
                .map_err(|_| integrity(format!("malformed token '{}'", found.as_str())))?;
            if map.lookup(kind, index).is_none() {
                return Err(integrity(format!("unknown token '{}'", found.as_str())));
            }
            *seen.entry((kind, index)).or_insert(0) += 1;
        }

        let mut missing = Vec::new();
        let mut duplicated = Vec::new();
        for token in &map.tokens {
            match seen.get(&(token.kind, token.index)).copied().unwrap_or(0) {
                0 => missing.push(token.token()),
                1 => {}
                _ => duplicated.push(token.token()),
            }
        }
        if !missing.is_empty() {
            return Err(integrity(format!("missing tokens {}", missing.join(", "))));
        }
        if !duplicated.is_empty() {
            return Err(integrity(format!("duplicated tokens {}", duplicated.join(", "))));
        }

        let escaped = escape_bare_markup(masked_text);
        let restored = LOOSE_TOKEN
            .replace_all(&escaped, |caps: &regex::Captures| {
                let value = PlaceholderKind::from_label(&caps[1])
                    .zip(caps[2].parse::<usize>().ok())
                    .and_then(|(kind, index)| map.lookup(kind, index));
                match value {
                    Some(token) => token.original_value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        parse_fragment(&restored)
            .map_err(|e| integrity(format!("restored fragment is not well-formed: {}", e)))?;

        Ok(restored)
    }

    /// Length-ratio plausibility check of a restored translation
    pub fn validate_quality(&self, original: &str, translated: &str, class: LanguageClass) -> bool {
        quality_failure(original, translated, class).is_none()
    }

    /// Same as `validate_quality`, with the failure reason as a segment error
    pub fn check_quality(
        &self,
        segment_index: usize,
        original: &str,
        translated: &str,
        class: LanguageClass,
    ) -> Result<(), SegmentError> {
        match quality_failure(original, translated, class) {
            None => Ok(()),
            Some(reason) => Err(SegmentError::QualityValidation {
                segment_index,
                reason,
            }),
        }
    }
}

/// Allowed translated/original ratio for a target class
pub fn ratio_band(class: LanguageClass) -> (f64, f64) {
    match class {
        LanguageClass::Compact => (0.2, 2.5),
        LanguageClass::Standard => (0.6, 1.8),
    }
}

fn quality_failure(original: &str, translated: &str, class: LanguageClass) -> Option<String> {
    let original_len = visible_length(original);
    let translated_len = visible_length(translated);

    if original_len > 0 && translated_len == 0 {
        return Some("empty translation of non-empty source".to_string());
    }
    if original_len < MIN_CHARS_FOR_RATIO {
        return None;
    }

    let ratio = translated_len as f64 / original_len as f64;
    let (low, high) = ratio_band(class);
    if ratio < low || ratio > high {
        return Some(format!(
            "length ratio {:.2} outside [{}, {}] ({} → {} chars)",
            ratio, low, high, original_len, translated_len
        ));
    }
    None
}

/// Visible characters of a markup fragment: tags removed, entities counted
/// as one character, whitespace ignored
pub fn visible_length(text: &str) -> usize {
    let without_atomic = ATOMIC_ELEMENTS
        .iter()
        .fold(text.to_string(), |acc, regex| regex.replace_all(&acc, "").into_owned());
    let without_comments = COMMENT_OR_CDATA.replace_all(&without_atomic, "");
    let without_tags = TAG.replace_all(&without_comments, "");
    let with_entities = ENTITY.replace_all(&without_tags, "_");
    with_entities.chars().filter(|c| !c.is_whitespace()).count()
}

/// Escape `&`, `<` and `>` that are not already part of an entity reference
fn escape_bare_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (position, c) in text.char_indices() {
        match c {
            '&' if ENTITY_AT_START.is_match(&text[position..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
