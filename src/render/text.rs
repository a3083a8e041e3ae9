use super::{document_blocks, Block, Renderer};
use crate::document::Document;

/// Plain text: blocks separated by a blank line, documents by a rule
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl PlainTextRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for PlainTextRenderer {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, documents: &[Document]) -> String {
        let chapters: Vec<String> = documents
            .iter()
            .filter(|d| d.in_spine)
            .map(|document| {
                document_blocks(document)
                    .into_iter()
                    .map(|block| match block {
                        Block::Paragraph(text) | Block::Preformatted(text) => text,
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .filter(|chapter| !chapter.is_empty())
            .collect();

        let mut out = chapters.join("\n\n* * *\n\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}
