/*!
 * Navigation label refresh.
 *
 * Table-of-contents labels that repeat a chapter title are replaced with
 * the translated title, so the NCX and the EPUB 3 navigation document agree
 * with the headings of the translated documents.
 *
 * The EPUB 3 navigation document is itself translated like any other
 * document, so its anchor labels are captured before reconstruction and
 * compared against the original titles afterwards. Anchors are identified by
 * their ordinal among the `<a>` elements of the document, which restoration
 * preserves.
 */

use log::debug;
use std::collections::HashMap;

use super::{parent_dir, resolve_href, NcxDocument};
use crate::document::{normalize_whitespace, Document};
use crate::markup::{Element, Node};
use crate::segmentation::reconstruct::TitleTranslation;

#[derive(Debug, Clone, PartialEq, Eq)]
struct NavAnchor {
    document_id: String,
    ordinal: usize,
    /// Container path the anchor points to
    target: Option<String>,
    label: String,
}

/// Anchor labels of the navigation documents before translation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavSnapshot {
    anchors: Vec<NavAnchor>,
}

impl NavSnapshot {
    pub fn capture(documents: &[Document]) -> Self {
        let mut anchors = Vec::new();
        for document in documents.iter().filter(|d| d.is_navigation) {
            let base_dir = parent_dir(&document.path);
            let mut found = Vec::new();
            for node in &document.markup.nodes {
                if let Node::Element(element) = node {
                    collect_anchors(element, &mut found);
                }
            }
            anchors.extend(found.into_iter().enumerate().map(|(ordinal, anchor)| NavAnchor {
                document_id: document.id.clone(),
                ordinal,
                target: anchor.attr("href").and_then(|href| resolve_href(base_dir, &href)),
                label: normalize_whitespace(&anchor.text_content()),
            }));
        }
        Self { anchors }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

fn collect_anchors<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    if element.local_name() == "a" {
        out.push(element);
    }
    for child in element.child_elements() {
        collect_anchors(child, out);
    }
}

/// Translated titles, by target document and by label
struct TitleIndex {
    by_target: HashMap<(String, String), String>,
    /// `None` marks a label with conflicting translations
    by_label: HashMap<String, Option<String>>,
}

impl TitleIndex {
    fn new(documents: &[Document], titles: &[TitleTranslation]) -> Self {
        let paths: HashMap<&str, &str> = documents
            .iter()
            .map(|d| (d.id.as_str(), d.path.as_str()))
            .collect();

        let mut by_target = HashMap::new();
        let mut by_label: HashMap<String, Option<String>> = HashMap::new();
        for title in titles {
            if let Some(path) = paths.get(title.document_id.as_str()) {
                by_target.insert(
                    (path.to_string(), title.original.clone()),
                    title.translated.clone(),
                );
            }
            by_label
                .entry(title.original.clone())
                .and_modify(|existing| {
                    if existing.as_deref() != Some(title.translated.as_str()) {
                        *existing = None;
                    }
                })
                .or_insert_with(|| Some(title.translated.clone()));
        }
        Self { by_target, by_label }
    }

    fn lookup(&self, target: Option<&str>, label: &str) -> Option<&str> {
        if let Some(target) = target
            && let Some(translated) = self.by_target.get(&(target.to_string(), label.to_string()))
        {
            return Some(translated);
        }
        self.by_label.get(label)?.as_deref()
    }
}

/// Replace anchor labels of the navigation documents that repeated an
/// original title. Returns the number of labels changed.
pub fn refresh_nav_documents(
    documents: &mut [Document],
    snapshot: &NavSnapshot,
    titles: &[TitleTranslation],
) -> usize {
    let index = TitleIndex::new(documents, titles);

    let mut replacements: HashMap<(String, usize), String> = HashMap::new();
    for anchor in &snapshot.anchors {
        if let Some(translated) = index.lookup(anchor.target.as_deref(), &anchor.label) {
            replacements.insert((anchor.document_id.clone(), anchor.ordinal), translated.to_string());
        }
    }

    let mut changed = 0;
    for document in documents.iter_mut().filter(|d| d.is_navigation) {
        let document_id = document.id.clone();
        let mut ordinal = 0;
        document.markup.visit_elements_mut(|element| {
            if element.local_name() != "a" {
                return;
            }
            if let Some(translated) = replacements.get(&(document_id.clone(), ordinal)) {
                element.children = vec![Node::Text(translated.clone())];
                changed += 1;
            }
            ordinal += 1;
        });
    }

    debug!("Refreshed {} navigation document labels", changed);
    changed
}

/// Replace NCX `navLabel` texts that repeat an original title. Returns the
/// number of labels changed.
pub fn refresh_ncx(ncx: &mut NcxDocument, documents: &[Document], titles: &[TitleTranslation]) -> usize {
    let index = TitleIndex::new(documents, titles);
    let base_dir = parent_dir(&ncx.path).to_string();
    let mut changed = 0;

    ncx.markup.visit_elements_mut(|element| {
        if element.local_name() != "navpoint" {
            return;
        }
        let target = element
            .child_elements()
            .find(|e| e.local_name() == "content")
            .and_then(|content| content.attr("src"))
            .and_then(|src| resolve_href(&base_dir, &src));

        let Some(text) = element
            .children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|e| e.local_name() == "navlabel")
            .and_then(|label| label.find_mut(&|e: &Element| e.local_name() == "text"))
        else {
            return;
        };

        let label = normalize_whitespace(&text.text_content());
        if let Some(translated) = index.lookup(target.as_deref(), &label) {
            text.children = vec![Node::Text(translated.to_string())];
            changed += 1;
        }
    });

    debug!("Refreshed {} NCX labels", changed);
    changed
}
