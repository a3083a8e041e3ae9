/*!
 * Content document model shared by the container, segmentation and render layers.
 */

use crate::markup::{Element, MarkupTree};

/// A linked markup document of the container
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Manifest id
    pub id: String,
    /// Path inside the container, e.g. `OEBPS/text/ch01.xhtml`
    pub path: String,
    /// Manifest media type
    pub media_type: String,
    /// Parsed markup
    pub markup: MarkupTree,
    /// Text of the `<title>` element, if any
    pub title: Option<String>,
    /// EPUB 3 navigation document
    pub is_navigation: bool,
    /// Listed in the spine
    pub in_spine: bool,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<String>, markup: MarkupTree) -> Self {
        let mut document = Self {
            id: id.into(),
            path: path.into(),
            media_type: "application/xhtml+xml".to_string(),
            markup,
            title: None,
            is_navigation: false,
            in_spine: true,
        };
        document.refresh_title();
        document
    }

    /// Re-read `title` from the markup
    pub fn refresh_title(&mut self) {
        self.title = self
            .markup
            .root()
            .and_then(|root| root.find(&|e: &Element| e.local_name() == "title"))
            .map(|title| normalize_whitespace(&title.text_content()))
            .filter(|title| !title.is_empty());
    }

    /// File name part of the path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
