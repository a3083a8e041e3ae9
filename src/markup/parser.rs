/*!
 * quick-xml driven parser producing an owned `MarkupTree`.
 *
 * Text is stored unescaped. Character references and the common HTML named
 * entities are folded into the surrounding text; any other named entity is
 * kept as an `EntityRef` node and written back verbatim.
 */

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::tree::{Attribute, Element, MarkupTree, Node};

const FRAGMENT_ROOT: &str = "epubwai-fragment";

/// Parse failure with the reader position
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkupError {
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("Unclosed element <{0}> at end of input")]
    Unclosed(String),

    #[error("Unexpected closing tag </{0}>")]
    UnexpectedClose(String),
}

/// Parse a complete document (prolog, root element, trailing misc)
pub fn parse_document(input: &str) -> Result<MarkupTree, MarkupError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let nodes = parse_nodes(input)?;
    Ok(MarkupTree { nodes })
}

/// Parse a fragment of mixed content (text and elements, no single root required)
pub fn parse_fragment(input: &str) -> Result<Vec<Node>, MarkupError> {
    let wrapped = format!("<{FRAGMENT_ROOT}>{input}</{FRAGMENT_ROOT}>");
    let mut nodes = parse_nodes(&wrapped)?;
    match nodes.pop() {
        Some(Node::Element(root)) if nodes.is_empty() && root.name == FRAGMENT_ROOT => {
            Ok(root.children)
        }
        _ => Err(MarkupError::UnexpectedClose(FRAGMENT_ROOT.to_string())),
    }
}

fn parse_nodes(input: &str) -> Result<Vec<Node>, MarkupError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    let mut top: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| MarkupError::Xml {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let element = start_element(&e, false).map_err(|message| MarkupError::Xml {
                    position: reader.buffer_position(),
                    message,
                })?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&e, true).map_err(|message| MarkupError::Xml {
                    position: reader.buffer_position(),
                    message,
                })?;
                push_node(&mut stack, &mut top, Node::Element(element));
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let element = stack
                    .pop()
                    .ok_or_else(|| MarkupError::UnexpectedClose(name.clone()))?;
                if element.name != name {
                    return Err(MarkupError::UnexpectedClose(name));
                }
                push_node(&mut stack, &mut top, Node::Element(element));
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_text(&mut stack, &mut top, &text);
            }
            Event::GeneralRef(e) => {
                let name = String::from_utf8_lossy(&e).into_owned();
                match resolve_entity(&name) {
                    Some(resolved) => push_text(&mut stack, &mut top, &resolved),
                    None => push_node(&mut stack, &mut top, Node::EntityRef(name)),
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_node(&mut stack, &mut top, Node::CData(text));
            }
            Event::Comment(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_node(&mut stack, &mut top, Node::Comment(text));
            }
            Event::Decl(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_node(&mut stack, &mut top, Node::Declaration(text));
            }
            Event::PI(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_node(&mut stack, &mut top, Node::ProcessingInstruction(text));
            }
            Event::DocType(e) => {
                let text = String::from_utf8_lossy(&e).trim().to_string();
                push_node(&mut stack, &mut top, Node::DocType(text));
            }
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.pop() {
        return Err(MarkupError::Unclosed(open.name));
    }

    Ok(top)
}

fn start_element(
    e: &quick_xml::events::BytesStart<'_>,
    self_closing: bool,
) -> Result<Element, String> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    element.self_closing = self_closing;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        element.attributes.push(Attribute {
            name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            raw_value: String::from_utf8_lossy(&attr.value).into_owned(),
        });
    }
    Ok(element)
}

fn push_node(stack: &mut [Element], top: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}

/// Append text, merging with a preceding text node
fn push_text(stack: &mut [Element], top: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    let siblings = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => top,
    };
    if let Some(Node::Text(previous)) = siblings.last_mut() {
        previous.push_str(text);
    } else {
        siblings.push(Node::Text(text.to_string()));
    }
}

/// Resolve a character reference or a known named entity
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(reference) = name.strip_prefix('#') {
        let code = match reference.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => reference.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "shy" => '\u{ad}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "deg" => '\u{b0}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "thinsp" => '\u{2009}',
        "ensp" => '\u{2002}',
        "emsp" => '\u{2003}',
        "zwnj" => '\u{200c}',
        "zwj" => '\u{200d}',
        _ => return None,
    };
    Some(c.to_string())
}
