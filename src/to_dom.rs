//! # Serializing into a tree

use crate::dom::{DomNode, Element};
use crate::fragment::Fragment;
use crate::mark::Mark;
use crate::node::Node;
use crate::schema::{MarkToDom, NodeToDom, Schema};
use displaydoc::Display;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while serializing
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum SerializeError {
    /// Multiple content holes
    MultipleHoles,
    /// Content hole must be the only child of its parent node
    HoleNotOnlyChild,
    /// Content hole not allowed in a leaf node spec
    HoleInLeaf,
    /// Content hole not allowed in a mark spec
    HoleInMark,
    /// Missing content hole in the spec of non-leaf node `{0}`
    MissingHole(String),
    /// A mark spec must render an element
    NonElementMark,
    /// No output spec defined for node type `{0}`
    MissingNodeSpec(String),
}

/// A description of an output tree shape: a text node, an element with
/// attributes and children, or the content hole marking where a node's
/// children are rendered.
///
/// A hole may appear at most once across a spec and must be the sole child of
/// its parent element.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    /// A text node
    Text(String),
    /// The position where the node's content belongs
    Hole,
    /// An element
    Element {
        /// The lowercase tag name
        tag: String,
        /// An optional namespace URI
        namespace: Option<String>,
        /// Attributes, in order
        attrs: Vec<(String, String)>,
        /// Child specs
        children: Vec<OutputSpec>,
    },
}

impl OutputSpec {
    /// An element spec with the given tag and nothing else.
    pub fn tag<T: Into<String>>(tag: T) -> OutputSpec {
        OutputSpec::Element {
            tag: tag.into(),
            namespace: None,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// An element spec whose single child is the content hole, the common
    /// shape for simple container nodes.
    pub fn with_hole<T: Into<String>>(tag: T) -> OutputSpec {
        OutputSpec::tag(tag).child(OutputSpec::Hole)
    }

    /// A text spec.
    pub fn text<T: Into<String>>(text: T) -> OutputSpec {
        OutputSpec::Text(text.into())
    }

    /// Builder-style: set the namespace. Only meaningful on elements.
    pub fn namespace<N: Into<String>>(mut self, ns: N) -> OutputSpec {
        if let OutputSpec::Element { namespace, .. } = &mut self {
            *namespace = Some(ns.into());
        }
        self
    }

    /// Builder-style: add an attribute. Only meaningful on elements.
    pub fn attr<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> OutputSpec {
        if let OutputSpec::Element { attrs, .. } = &mut self {
            attrs.push((name.into(), value.into()));
        }
        self
    }

    /// Builder-style: add a child spec. Only meaningful on elements.
    pub fn child(mut self, spec: OutputSpec) -> OutputSpec {
        if let OutputSpec::Element { children, .. } = &mut self {
            children.push(spec);
        }
        self
    }
}

/// Options passed through a serialization pass.
#[derive(Default)]
pub struct SerializeOptions<'a> {
    /// When set, called instead of recursively rendering a node's content
    /// into its hole element.
    pub on_content: Option<&'a dyn Fn(&Node, &mut Element)>,
}

/// A serializer knows how to convert documents of its schema to the owned
/// tree of the [`crate::dom`] module, by calling the output-spec closures
/// registered per node and mark type.
pub struct DomSerializer {
    schema: Schema,
    nodes: HashMap<String, NodeToDom>,
    marks: HashMap<String, MarkToDom>,
}

impl DomSerializer {
    /// Create a serializer. `nodes` maps node names to output-spec producers.
    /// `marks` does the same for marks; a mark type that is absent serializes
    /// to nothing, without splitting the marks around it.
    pub fn new(
        schema: &Schema,
        nodes: HashMap<String, NodeToDom>,
        marks: HashMap<String, MarkToDom>,
    ) -> DomSerializer {
        DomSerializer {
            schema: schema.clone(),
            nodes,
            marks,
        }
    }

    /// Build (and cache on the schema) a serializer using the `to_dom` specs
    /// of the schema's node and mark types.
    pub fn from_schema(schema: &Schema) -> Arc<DomSerializer> {
        if let Some(cached) = schema.cached("dom_serializer") {
            if let Ok(serializer) = cached.downcast::<DomSerializer>() {
                return serializer;
            }
        }
        let mut nodes: HashMap<String, NodeToDom> = HashMap::new();
        for r#type in schema.node_types() {
            if let Some(to_dom) = &r#type.spec().to_dom {
                nodes.insert(r#type.name().to_owned(), to_dom.clone());
            }
        }
        // Text nodes render as their text unless the schema overrides it
        nodes
            .entry("text".to_owned())
            .or_insert_with(|| {
                Arc::new(|node: &Node| {
                    OutputSpec::text(node.as_text().map(|t| t.as_str()).unwrap_or_default())
                })
            });
        let mut marks: HashMap<String, MarkToDom> = HashMap::new();
        for r#type in schema.mark_types() {
            if let Some(to_dom) = &r#type.spec().to_dom {
                marks.insert(r#type.name().to_owned(), to_dom.clone());
            }
        }
        let serializer = Arc::new(DomSerializer::new(schema, nodes, marks));
        schema.set_cached("dom_serializer", serializer.clone());
        serializer
    }

    /// The schema this serializer belongs to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Serialize the content of a fragment to a list of tree nodes.
    pub fn serialize_fragment(
        &self,
        fragment: &Fragment,
        options: &SerializeOptions,
    ) -> Result<Vec<DomNode>, SerializeError> {
        let mut out = Vec::new();
        self.serialize_fragment_into(&mut out, fragment, options)?;
        Ok(out)
    }

    fn serialize_fragment_into(
        &self,
        out: &mut Vec<DomNode>,
        fragment: &Fragment,
        options: &SerializeOptions,
    ) -> Result<(), SerializeError> {
        let mut active: Vec<(Mark, Element)> = Vec::new();
        for child in fragment.children() {
            let marks: Vec<&Mark> = child.marks().iter().collect();

            // Find the longest prefix of open mark wrappers that carries over
            // to this node, then close the rest and open what is missing.
            let mut keep = 0;
            let mut rendered = 0;
            while keep < active.len() && rendered < marks.len() {
                let next = marks[rendered];
                if !self.marks.contains_key(next.r#type().name()) {
                    rendered += 1;
                    continue;
                }
                if next != &active[keep].0 || !next.r#type().spanning() {
                    break;
                }
                keep += 1;
                rendered += 1;
            }
            while active.len() > keep {
                let (_, element) = active.pop().unwrap();
                push(out, &mut active, DomNode::Element(element));
            }
            while rendered < marks.len() {
                let add = marks[rendered];
                rendered += 1;
                if let Some(serializer) = self.marks.get(add.r#type().name()) {
                    let element = self.render_mark(serializer, add, child.is_inline())?;
                    active.push((add.clone(), element));
                }
            }
            let dom = self.serialize_node_inner(child, options)?;
            push(out, &mut active, dom);
        }
        while let Some((_, element)) = active.pop() {
            push(out, &mut active, DomNode::Element(element));
        }
        Ok(())
    }

    /// Serialize a single node, wrapped in its marks.
    pub fn serialize_node(
        &self,
        node: &Node,
        options: &SerializeOptions,
    ) -> Result<DomNode, SerializeError> {
        let mut dom = self.serialize_node_inner(node, options)?;
        for mark in node.marks().iter().rev() {
            if let Some(serializer) = self.marks.get(mark.r#type().name()) {
                let mut element = self.render_mark(serializer, mark, node.is_inline())?;
                element.append(dom);
                dom = DomNode::Element(element);
            }
        }
        Ok(dom)
    }

    fn render_mark(
        &self,
        serializer: &MarkToDom,
        mark: &Mark,
        inline: bool,
    ) -> Result<Element, SerializeError> {
        let (dom, hole) = render_spec(serializer(mark, inline))?;
        if hole.is_some() {
            return Err(SerializeError::HoleInMark);
        }
        match dom {
            DomNode::Element(element) => Ok(element),
            DomNode::Text(_) => Err(SerializeError::NonElementMark),
        }
    }

    fn serialize_node_inner(
        &self,
        node: &Node,
        options: &SerializeOptions,
    ) -> Result<DomNode, SerializeError> {
        let to_dom = self
            .nodes
            .get(node.r#type().name())
            .ok_or_else(|| SerializeError::MissingNodeSpec(node.r#type().name().to_owned()))?;
        let (mut dom, hole) = render_spec(to_dom(node))?;
        match hole {
            Some(path) => {
                if node.is_leaf() {
                    return Err(SerializeError::HoleInLeaf);
                }
                let target = element_at_path(&mut dom, &path);
                match options.on_content {
                    Some(on_content) => on_content(node, target),
                    None => {
                        let mut content = Vec::new();
                        self.serialize_fragment_into(&mut content, node.content(), options)?;
                        for child in content {
                            target.append(child);
                        }
                    }
                }
            }
            None => {
                if !node.is_leaf() {
                    return Err(SerializeError::MissingHole(
                        node.r#type().name().to_owned(),
                    ));
                }
            }
        }
        Ok(dom)
    }
}

fn push(out: &mut Vec<DomNode>, active: &mut Vec<(Mark, Element)>, node: DomNode) {
    match active.last_mut() {
        Some((_, element)) => element.append(node),
        None => out.push(node),
    }
}

fn element_at_path<'a>(dom: &'a mut DomNode, path: &[usize]) -> &'a mut Element {
    let mut element = dom
        .as_element_mut()
        .expect("hole paths always point through elements");
    for index in path {
        element = element.children_mut()[*index]
            .as_element_mut()
            .expect("hole paths always point through elements");
    }
    element
}

/// Instantiate an output spec, returning the built tree node and, when the
/// spec contains a content hole, the child-index path to the element holding
/// it.
fn render_spec(spec: OutputSpec) -> Result<(DomNode, Option<Vec<usize>>), SerializeError> {
    match spec {
        OutputSpec::Text(text) => Ok((DomNode::Text(text), None)),
        OutputSpec::Hole => Err(SerializeError::HoleNotOnlyChild),
        OutputSpec::Element {
            tag,
            namespace,
            attrs,
            children,
        } => {
            let mut element = match namespace {
                Some(ns) => Element::with_namespace(ns, tag),
                None => Element::new(tag),
            };
            for (name, value) in attrs {
                element.set_attr(name, value);
            }
            let mut hole: Option<Vec<usize>> = None;
            for (i, child) in children.into_iter().enumerate() {
                if let OutputSpec::Hole = child {
                    if hole.is_some() {
                        return Err(SerializeError::MultipleHoles);
                    }
                    if i > 0 {
                        return Err(SerializeError::HoleNotOnlyChild);
                    }
                    hole = Some(Vec::new());
                    continue;
                }
                if matches!(hole, Some(ref path) if path.is_empty()) {
                    // A sibling after a direct hole
                    return Err(SerializeError::HoleNotOnlyChild);
                }
                let (child_dom, child_hole) = render_spec(child)?;
                if let Some(mut inner) = child_hole {
                    if hole.is_some() {
                        return Err(SerializeError::MultipleHoles);
                    }
                    inner.insert(0, element.children().len());
                    hole = Some(inner);
                }
                element.append(child_dom);
            }
            Ok((DomNode::Element(element), hole))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{render_spec, OutputSpec, SerializeError};

    #[test]
    fn renders_a_nested_spec() {
        let spec = OutputSpec::tag("div")
            .attr("class", "note")
            .child(OutputSpec::with_hole("p"));
        let (dom, hole) = render_spec(spec).unwrap();
        assert_eq!(dom.to_string(), "<div class=\"note\"><p></p></div>");
        assert_eq!(hole, Some(vec![0]));
    }

    #[test]
    fn rejects_two_holes() {
        let spec = OutputSpec::tag("div")
            .child(OutputSpec::with_hole("p"))
            .child(OutputSpec::with_hole("p"));
        assert_eq!(render_spec(spec).unwrap_err(), SerializeError::MultipleHoles);
    }

    #[test]
    fn rejects_a_hole_with_siblings() {
        let spec = OutputSpec::tag("p")
            .child(OutputSpec::text("!"))
            .child(OutputSpec::Hole);
        assert_eq!(
            render_spec(spec).unwrap_err(),
            SerializeError::HoleNotOnlyChild
        );
    }
}
