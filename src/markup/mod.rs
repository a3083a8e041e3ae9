/*!
 * Lightweight markup tree for XHTML content documents.
 *
 * Content documents are parsed once into an owned tree of `Node`s so that
 * segmentation can record stable child-index addresses and reconstruction
 * can replay them. Serialization writes the tree back with the same element
 * names, attribute values (kept in their escaped form) and whitespace, so
 * parse → serialize → parse yields an identical tree.
 *
 * - `tree`: node types and address helpers
 * - `parser`: quick-xml driven parser for documents and fragments
 * - `serialize`: tree → string
 */

pub mod parser;
pub mod serialize;
pub mod tree;

pub use parser::{parse_document, parse_fragment, MarkupError};
pub use serialize::{serialize_nodes, serialize_tree};
pub use tree::{Attribute, Element, MarkupTree, Node, NodePath};
