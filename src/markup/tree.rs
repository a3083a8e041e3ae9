use quick_xml::escape::{escape, unescape};
use serde::{Deserialize, Serialize};

/// Path of child indices from the tree's top-level node list to an element.
///
/// `[2, 1, 0]` means: top-level node 2, its child 1, that child's child 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    /// Path to a top-level node
    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    /// Path to the `index`-th child of this node
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// An attribute with its value kept exactly as written (still escaped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub raw_value: String,
}

/// An element node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `p` or `epub:switch`
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Written as `<name/>` in the source
    pub self_closing: bool,
}

/// A node of the markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, unescaped
    Text(String),
    /// A named entity reference the parser could not resolve, kept verbatim
    EntityRef(String),
    Comment(String),
    CData(String),
    ProcessingInstruction(String),
    Declaration(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl Element {
    /// Create an element with no attributes or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// Local part of the element name, lowercased
    pub fn local_name(&self) -> String {
        local_part(&self.name).to_ascii_lowercase()
    }

    /// Unescaped value of an attribute, matched on the full qualified name
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| match unescape(&a.raw_value) {
                Ok(value) => value.into_owned(),
                Err(_) => a.raw_value.clone(),
            })
    }

    /// Set (or add) an attribute, escaping the given value
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let raw_value = escape(value).into_owned();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.raw_value = raw_value,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                raw_value,
            }),
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Child elements only
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Depth-first search for the first descendant element matching a predicate
    pub fn find<F>(&self, predicate: &F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        for child in self.child_elements() {
            if predicate(child) {
                return Some(child);
            }
            if let Some(found) = child.find(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first search for the first descendant element matching a
    /// predicate, mutably
    pub fn find_mut<F>(&mut self, predicate: &F) -> Option<&mut Element>
    where
        F: Fn(&Element) -> bool,
    {
        for child in self.children.iter_mut() {
            if let Node::Element(element) = child {
                let found = if predicate(element) {
                    Some(element)
                } else {
                    element.find_mut(predicate)
                };
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }

    /// Visit every descendant element mutably, in document order
    pub fn visit_mut<F>(&mut self, visitor: &mut F)
    where
        F: FnMut(&mut Element),
    {
        for child in self.children.iter_mut() {
            if let Node::Element(element) = child {
                visitor(element);
                element.visit_mut(visitor);
            }
        }
    }
}

/// A parsed document: the prolog nodes plus the root element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupTree {
    pub nodes: Vec<Node>,
}

impl MarkupTree {
    /// The first top-level element
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(Node::as_element)
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(Node::as_element_mut)
    }

    /// Resolve a path to an element
    pub fn element_at(&self, path: &NodePath) -> Option<&Element> {
        let (first, rest) = path.0.split_first()?;
        let mut current = self.nodes.get(*first)?.as_element()?;
        for index in rest {
            current = current.children.get(*index)?.as_element()?;
        }
        Some(current)
    }

    /// Resolve a path to an element, mutably
    pub fn element_at_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let (first, rest) = path.0.split_first()?;
        let mut current = self.nodes.get_mut(*first)?.as_element_mut()?;
        for index in rest {
            current = current.children.get_mut(*index)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Visit every element mutably, in document order
    pub fn visit_elements_mut<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&mut Element),
    {
        for node in self.nodes.iter_mut() {
            if let Node::Element(element) = node {
                visitor(element);
                element.visit_mut(&mut visitor);
            }
        }
    }

    /// Find the first `<body>` element
    pub fn body(&self) -> Option<&Element> {
        let root = self.root()?;
        if root.local_name() == "body" {
            return Some(root);
        }
        root.find(&|e: &Element| e.local_name() == "body")
    }
}

/// Strip a namespace prefix from a qualified name
pub fn local_part(name: &str) -> &str {
    match name.rfind(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::CData(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
            _ => {}
        }
    }
}
