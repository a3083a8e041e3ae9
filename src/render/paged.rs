use super::{document_blocks, Block, Renderer};
use crate::document::Document;

/// Lines reserved at the bottom of each page: a blank line and the number
const FOOTER_LINES: usize = 2;

pub const MIN_PAGE_WIDTH: usize = 20;
pub const MIN_PAGE_LINES: usize = 5;

const PAGE_BREAK: char = '\u{000C}';

/// Fixed-geometry text pages.
///
/// Every page has exactly `lines_per_page` lines of at most `width`
/// characters: the wrapped text, padding, a blank line and a centered page
/// number. Pages are separated by form feeds and each document starts on a
/// new page.
#[derive(Debug, Clone, Copy)]
pub struct PagedTextRenderer {
    width: usize,
    lines_per_page: usize,
}

impl PagedTextRenderer {
    pub fn new(width: usize, lines_per_page: usize) -> Self {
        Self {
            width: width.max(MIN_PAGE_WIDTH),
            lines_per_page: lines_per_page.max(MIN_PAGE_LINES),
        }
    }

    fn body_height(&self) -> usize {
        self.lines_per_page - FOOTER_LINES
    }

    /// Body lines of every page
    pub fn paginate(&self, documents: &[Document]) -> Vec<Vec<String>> {
        let height = self.body_height();
        let mut pages = Vec::new();

        for document in documents.iter().filter(|d| d.in_spine) {
            let mut current: Vec<String> = Vec::new();
            for block in document_blocks(document) {
                if !current.is_empty() && current.len() < height {
                    current.push(String::new());
                }
                for line in self.wrap_block(&block) {
                    if current.len() == height {
                        pages.push(std::mem::take(&mut current));
                    }
                    current.push(line);
                }
            }
            if !current.is_empty() {
                pages.push(current);
            }
        }
        pages
    }

    fn wrap_block(&self, block: &Block) -> Vec<String> {
        match block {
            Block::Paragraph(text) => text.split('\n').flat_map(|line| wrap_words(line, self.width)).collect(),
            Block::Preformatted(text) => text
                .split('\n')
                .flat_map(|line| split_chars(line.trim_end(), self.width))
                .collect(),
        }
    }

    fn footer(&self, page_number: usize) -> String {
        format!("{:^width$}", format!("- {} -", page_number), width = self.width)
            .trim_end()
            .to_string()
    }
}

impl Renderer for PagedTextRenderer {
    fn extension(&self) -> &'static str {
        "pages.txt"
    }

    fn render(&self, documents: &[Document]) -> String {
        let height = self.body_height();
        self.paginate(documents)
            .into_iter()
            .enumerate()
            .map(|(index, mut lines)| {
                lines.resize(height, String::new());
                lines.push(String::new());
                lines.push(self.footer(index + 1));
                let mut page = lines
                    .iter()
                    .map(|line| line.trim_end())
                    .collect::<Vec<_>>()
                    .join("\n");
                page.push('\n');
                page
            })
            .collect::<Vec<_>>()
            .join(&PAGE_BREAK.to_string())
    }
}

/// Greedy word wrap; words longer than a line are split
fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        for piece in split_chars(word, width) {
            let piece_len = piece.chars().count();
            if current_len > 0 && current_len + 1 + piece_len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Cut a string into pieces of at most `width` characters
fn split_chars(text: &str, width: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(width.max(1)).map(|chunk| chunk.iter().collect()).collect()
}
