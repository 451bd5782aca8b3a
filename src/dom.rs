//! # The source/target tree
//!
//! The parser reads from, and the serializer writes to, a DOM-shaped tree.
//! The reading side is abstracted behind the object-safe [`Dom`] trait so
//! that hosts can wrap a browser DOM or any other structured tree; this
//! module also ships an owned element/text tree that implements the trait and
//! doubles as the serializer's output type.

use indexmap::IndexMap;
use std::fmt;

/// The kind of a tree node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DomKind {
    /// An element with a tag name, attributes, and children
    Element,
    /// A text node
    Text,
    /// Anything else (comments, processing instructions); skipped by the
    /// parser
    Other,
}

/// A read interface over a DOM-shaped tree.
///
/// Tag names are expected in lower case; the selector strings passed to
/// [`Dom::matches`] use the subset of CSS that schemas use in their parse
/// rules: a tag name or `*`, optional `[attr]` / `[attr=value]` qualifiers,
/// and `,`-separated alternatives.
pub trait Dom {
    /// What kind of node this is.
    fn kind(&self) -> DomKind;

    /// The string value of a text node.
    fn node_value(&self) -> Option<&str>;

    /// The lowercase tag name of an element, or `""` for other nodes.
    fn node_name(&self) -> &str;

    /// The namespace URI of an element, if any.
    fn namespace(&self) -> Option<&str>;

    /// Look up an attribute on an element.
    fn attr(&self, name: &str) -> Option<&str>;

    /// The inline style declarations of an element as `(property, value)`
    /// pairs, in declaration order.
    fn styles(&self) -> Vec<(String, String)>;

    /// The number of child nodes.
    fn child_count(&self) -> usize;

    /// The child node at the given index. Panics when out of range.
    fn child(&self, index: usize) -> &dyn Dom;

    /// Test this node against a CSS selector.
    fn matches(&self, selector: &str) -> bool;

    /// Whether `other` is this node or a descendant of it.
    fn contains(&self, other: &dyn Dom) -> bool;

    /// Identity comparison; true when both references point at the same
    /// underlying node.
    fn same_node(&self, other: &dyn Dom) -> bool {
        std::ptr::eq(
            self as *const Self as *const u8,
            other as *const dyn Dom as *const u8,
        )
    }
}

/// Find the first descendant of `dom` (not `dom` itself) matching the
/// selector, depth-first.
pub(crate) fn query_selector<'a>(dom: &'a dyn Dom, selector: &str) -> Option<&'a dyn Dom> {
    for i in 0..dom.child_count() {
        let child = dom.child(i);
        if child.kind() == DomKind::Element && child.matches(selector) {
            return Some(child);
        }
        if let Some(found) = query_selector(child, selector) {
            return Some(found);
        }
    }
    None
}

/// A node in the crate's owned tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    /// An element
    Element(Element),
    /// A text node
    Text(String),
}

impl DomNode {
    /// A text node with the given content.
    pub fn text<T: Into<String>>(text: T) -> DomNode {
        DomNode::Text(text.into())
    }

    /// The element inside this node, if it is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            DomNode::Element(element) => Some(element),
            DomNode::Text(_) => None,
        }
    }

    /// Mutable access to the element inside this node.
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            DomNode::Element(element) => Some(element),
            DomNode::Text(_) => None,
        }
    }
}

impl From<Element> for DomNode {
    fn from(element: Element) -> DomNode {
        DomNode::Element(element)
    }
}

impl From<&str> for DomNode {
    fn from(text: &str) -> DomNode {
        DomNode::Text(text.to_owned())
    }
}

/// An element in the owned tree: a lowercase tag name, optional namespace,
/// ordered attributes, and child nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    name: String,
    namespace: Option<String>,
    attrs: IndexMap<String, String>,
    children: Vec<DomNode>,
}

impl Element {
    /// Create an element with the given tag name.
    pub fn new<T: Into<String>>(name: T) -> Element {
        Element {
            name: name.into().to_ascii_lowercase(),
            namespace: None,
            attrs: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Create an element in the given namespace.
    pub fn with_namespace<N: Into<String>, T: Into<String>>(namespace: N, name: T) -> Element {
        let mut element = Element::new(name);
        element.namespace = Some(namespace.into());
        element
    }

    /// Builder-style: set an attribute.
    pub fn attr<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Element {
        self.set_attr(name, value);
        self
    }

    /// Builder-style: append a child.
    pub fn child<C: Into<DomNode>>(mut self, child: C) -> Element {
        self.append(child.into());
        self
    }

    /// The lowercase tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace URI, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Look up an attribute value.
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute.
    pub fn set_attr<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.attrs.insert(name.into(), value.into());
    }

    /// The attributes, in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append a child node.
    pub fn append(&mut self, child: DomNode) {
        self.children.push(child);
    }

    /// The element's children.
    pub fn children(&self) -> &[DomNode] {
        &self.children
    }

    /// Mutable access to the element's children.
    pub fn children_mut(&mut self) -> &mut Vec<DomNode> {
        &mut self.children
    }

    /// The inline style declarations from the `style` attribute.
    pub fn style_declarations(&self) -> Vec<(String, String)> {
        let mut declarations = Vec::new();
        if let Some(style) = self.get_attr("style") {
            for declaration in style.split(';') {
                if let Some(colon) = declaration.find(':') {
                    let prop = declaration[..colon].trim().to_ascii_lowercase();
                    let value = declaration[colon + 1..].trim().to_owned();
                    if !prop.is_empty() {
                        declarations.push((prop, value));
                    }
                }
            }
        }
        declarations
    }

    fn matches_single(&self, selector: &str) -> bool {
        let selector = selector.trim();
        let (tag, rest) = match selector.find('[') {
            Some(bracket) => (&selector[..bracket], &selector[bracket..]),
            None => (selector, ""),
        };
        let tag = tag.trim();
        if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&self.name) {
            return false;
        }
        let mut rest = rest;
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = match stripped.find(']') {
                Some(close) => close,
                None => return false,
            };
            let qualifier = &stripped[..close];
            rest = &stripped[close + 1..];
            let matched = match qualifier.find('=') {
                Some(eq) => {
                    let name = qualifier[..eq].trim();
                    let value = qualifier[eq + 1..].trim().trim_matches('"');
                    self.get_attr(name) == Some(value)
                }
                None => self.get_attr(qualifier.trim()).is_some(),
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

impl Dom for DomNode {
    fn kind(&self) -> DomKind {
        match self {
            DomNode::Element(_) => DomKind::Element,
            DomNode::Text(_) => DomKind::Text,
        }
    }

    fn node_value(&self) -> Option<&str> {
        match self {
            DomNode::Text(text) => Some(text),
            DomNode::Element(_) => None,
        }
    }

    fn node_name(&self) -> &str {
        match self {
            DomNode::Element(element) => &element.name,
            DomNode::Text(_) => "",
        }
    }

    fn namespace(&self) -> Option<&str> {
        self.as_element().and_then(Element::namespace)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.as_element().and_then(|element| element.get_attr(name))
    }

    fn styles(&self) -> Vec<(String, String)> {
        self.as_element()
            .map(Element::style_declarations)
            .unwrap_or_default()
    }

    fn child_count(&self) -> usize {
        self.as_element().map_or(0, |element| element.children.len())
    }

    fn child(&self, index: usize) -> &dyn Dom {
        &self.as_element().expect("child() on a text node").children[index]
    }

    fn matches(&self, selector: &str) -> bool {
        match self {
            DomNode::Element(element) => selector
                .split(',')
                .any(|single| element.matches_single(single)),
            DomNode::Text(_) => false,
        }
    }

    fn contains(&self, other: &dyn Dom) -> bool {
        if self.same_node(other) {
            return true;
        }
        if let DomNode::Element(element) = self {
            element.children.iter().any(|child| child.contains(other))
        } else {
            false
        }
    }
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn escape_text(text: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            _ => fmt::Write::write_char(out, c)?,
        }
    }
    Ok(())
}

impl fmt::Display for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomNode::Text(text) => escape_text(text, f),
            DomNode::Element(element) => element.fmt(f),
        }
    }
}

impl fmt::Display for Element {
    /// Renders the subtree as markup, without any pretty-printing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (name, value) in &self.attrs {
            write!(f, " {}=\"{}\"", name, value.replace('"', "&quot;"))?;
        }
        f.write_str(">")?;
        if VOID_TAGS.contains(&self.name.as_str()) {
            return Ok(());
        }
        for child in &self.children {
            child.fmt(f)?;
        }
        write!(f, "</{}>", self.name)
    }
}
