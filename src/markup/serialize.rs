use quick_xml::escape::partial_escape;

use super::tree::{Element, MarkupTree, Node};

/// Serialize a whole document tree
pub fn serialize_tree(tree: &MarkupTree) -> String {
    serialize_nodes(&tree.nodes)
}

/// Serialize a sequence of sibling nodes
pub fn serialize_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => write_element(element, out),
        Node::Text(text) => out.push_str(&partial_escape(text)),
        Node::EntityRef(name) => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Node::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        Node::ProcessingInstruction(text) | Node::Declaration(text) => {
            out.push_str("<?");
            out.push_str(text);
            out.push_str("?>");
        }
        Node::DocType(text) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(text);
            out.push('>');
        }
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for attr in &element.attributes {
        // Raw values may legitimately contain the other quote character
        let quote = if attr.raw_value.contains('"') { '\'' } else { '"' };
        out.push(' ');
        out.push_str(&attr.name);
        out.push('=');
        out.push(quote);
        out.push_str(&attr.raw_value);
        out.push(quote);
    }

    if element.self_closing && element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &element.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}
