/*!
 * Secondary renditions of translated documents.
 *
 * Renderers only read the rewritten documents; they never translate.
 *
 * - `text`: Plain text, one block per paragraph
 * - `paged`: Fixed-geometry pages separated by form feeds
 */

use crate::document::{normalize_whitespace, Document};
use crate::markup::{Element, Node};
use crate::segmentation::rules::{tag_role, TagRole};

pub mod paged;
pub mod text;

pub use paged::PagedTextRenderer;
pub use text::PlainTextRenderer;

/// Hard line break inside a paragraph, distinct from source newlines
const LINE_BREAK: char = '\u{2028}';

/// Verbatim elements whose text is never shown
const HIDDEN_TAGS: &[&str] = &["script", "style", "template", "noscript", "head"];

/// Turns documents into a single text rendition
pub trait Renderer {
    /// File extension of the rendition
    fn extension(&self) -> &'static str;

    fn render(&self, documents: &[Document]) -> String;
}

/// A block of visible text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Whitespace-normalized paragraph text
    Paragraph(String),
    /// Preformatted text, kept line for line
    Preformatted(String),
}

/// Visible text blocks of a document body, in document order
pub fn document_blocks(document: &Document) -> Vec<Block> {
    let mut collector = BlockCollector::default();
    let body = document.markup.body().or_else(|| document.markup.root());
    if let Some(body) = body {
        collector.walk(body);
    }
    collector.flush();
    collector.blocks
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    current: String,
}

impl BlockCollector {
    fn flush(&mut self) {
        let lines: Vec<String> = self
            .current
            .split(LINE_BREAK)
            .map(normalize_whitespace)
            .filter(|line| !line.is_empty())
            .collect();
        if !lines.is_empty() {
            self.blocks.push(Block::Paragraph(lines.join("\n")));
        }
        self.current.clear();
    }

    fn walk(&mut self, element: &Element) {
        for child in &element.children {
            match child {
                Node::Text(text) | Node::CData(text) => self.current.push_str(text),
                Node::Element(child) => self.element(child),
                _ => {}
            }
        }
    }

    fn element(&mut self, element: &Element) {
        let name = element.local_name();
        if HIDDEN_TAGS.contains(&name.as_str()) {
            return;
        }

        match (name.as_str(), tag_role(&name)) {
            ("br", _) => self.current.push(LINE_BREAK),
            ("img", _) => {
                if let Some(alt) = element.attr("alt").filter(|alt| !alt.trim().is_empty()) {
                    self.current.push_str(&format!("[{}]", alt.trim()));
                }
            }
            ("pre", _) => {
                self.flush();
                let text = element.text_content();
                let text = text.trim_matches('\n');
                if !text.trim().is_empty() {
                    self.blocks.push(Block::Preformatted(text.to_string()));
                }
            }
            ("svg" | "math", _) => {}
            (_, TagRole::Inline | TagRole::AtomicInline) => self.walk(element),
            (_, TagRole::Verbatim | TagRole::Container) => {
                self.flush();
                self.walk(element);
                self.flush();
            }
        }
    }
}
