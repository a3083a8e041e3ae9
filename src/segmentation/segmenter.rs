use log::{debug, trace};

use super::rules::{self, TagRole};
use super::{ReconstructionEntry, ReconstructionMap, Segment};
use crate::document::Document;
use crate::markup::{serialize_nodes, Element, Node, NodePath};

/// Extracts translatable runs from documents and replays them back.
#[derive(Debug, Clone, Default)]
pub struct Segmenter;

/// Accumulator shared by one `segment` call
#[derive(Default)]
struct SegmentSink {
    segments: Vec<Segment>,
    map: ReconstructionMap,
}

impl Segmenter {
    pub fn new() -> Self {
        Self
    }

    /// Extract segments from documents, in document order then tree order
    pub fn segment(&self, documents: &[Document]) -> (Vec<Segment>, ReconstructionMap) {
        let mut sink = SegmentSink::default();

        for document in documents {
            let before = sink.segments.len();
            for (index, node) in document.markup.nodes.iter().enumerate() {
                if let Node::Element(element) = node {
                    if rules::tag_role(&element.local_name()) == TagRole::Container {
                        self.walk_element(element, &NodePath::root(index), &document.id, &mut sink);
                    }
                }
            }
            debug!(
                "Segmented {}: {} segments",
                document.path,
                sink.segments.len() - before
            );
        }

        (sink.segments, sink.map)
    }

    fn walk_element(&self, element: &Element, path: &NodePath, document_id: &str, sink: &mut SegmentSink) {
        let title_bearing = rules::is_title_bearing(&element.local_name());
        let mut run_start: Option<usize> = None;

        for (index, child) in element.children.iter().enumerate() {
            let role = match child {
                Node::Element(child_element) => Some(rules::tag_role(&child_element.local_name())),
                _ => None,
            };

            match (role, child) {
                (Some(TagRole::Container), Node::Element(child_element)) => {
                    if let Some(start) = run_start.take() {
                        self.emit_run(element, path, start, index, title_bearing, document_id, sink);
                    }
                    self.walk_element(child_element, &path.child(index), document_id, sink);
                }
                (Some(TagRole::Verbatim), _) => {
                    if let Some(start) = run_start.take() {
                        self.emit_run(element, path, start, index, title_bearing, document_id, sink);
                    }
                }
                _ => {
                    if run_start.is_none() {
                        run_start = Some(index);
                    }
                }
            }
        }

        if let Some(start) = run_start {
            let end = element.children.len();
            self.emit_run(element, path, start, end, title_bearing, document_id, sink);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_run(
        &self,
        parent: &Element,
        path: &NodePath,
        start: usize,
        end: usize,
        title_bearing: bool,
        document_id: &str,
        sink: &mut SegmentSink,
    ) {
        let nodes = &parent.children[start..end];
        let visible = visible_text(nodes);
        if !rules::is_translatable(&visible) {
            trace!("Skipping run {}[{}..{}]: {:?}", path, start, end, visible.trim());
            return;
        }

        let serialized = serialize_nodes(nodes);
        let trimmed_start = serialized.trim_start();
        let leading_whitespace = serialized[..serialized.len() - trimmed_start.len()].to_string();
        let text = trimmed_start.trim_end();
        let trailing_whitespace = trimmed_start[text.len()..].to_string();

        let index = sink.segments.len();
        sink.segments.push(Segment {
            index,
            text: text.to_string(),
            source_document_id: document_id.to_string(),
            node_path: path.clone(),
        });
        sink.map.entries.push(ReconstructionEntry {
            document_id: document_id.to_string(),
            node_path: path.clone(),
            start,
            end,
            leading_whitespace,
            trailing_whitespace,
            title_bearing,
        });
    }
}

/// Human-visible text of a run: text of inline descendants, excluding
/// atomic and verbatim elements, comments and markup
pub fn visible_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    collect_visible(nodes, &mut out);
    out
}

fn collect_visible(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => match rules::tag_role(&element.local_name()) {
                TagRole::Inline | TagRole::Container => collect_visible(&element.children, out),
                TagRole::AtomicInline | TagRole::Verbatim => {}
            },
            _ => {}
        }
    }
}
