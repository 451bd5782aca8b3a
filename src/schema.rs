//! # Schema compilation
//!
//! A [`Schema`] is compiled once from a [`SchemaSpec`] and afterwards
//! immutable. Node and mark types are stored in arenas owned by the schema;
//! [`NodeType`] and [`MarkType`] are cheap `(schema, index)` handles into
//! them, so the type ↔ schema back-reference needs no ownership cycle.

use crate::attrs::{compute_attrs, default_attrs, AttrError, AttributeSpec, Attrs};
use crate::content::{self, ContentError, ContentMatch, MatchArena, TypeMeta};
use crate::fragment::Fragment;
use crate::from_dom::ParseRule;
use crate::mark::{Mark, MarkSet};
use crate::node::Node;
use crate::to_dom::OutputSpec;
use derivative::Derivative;
use displaydoc::Display;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Renders a node to an output template.
pub type NodeToDom = Arc<dyn Fn(&Node) -> OutputSpec + Send + Sync>;
/// Renders a mark to an output template. The second argument is true when the
/// marked content is inline.
pub type MarkToDom = Arc<dyn Fn(&Mark, bool) -> OutputSpec + Send + Sync>;
/// Projects a leaf node to text for `text_between`.
pub type LeafText = Arc<dyn Fn(&Node) -> String + Send + Sync>;

/// The whitespace handling of a node type's content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whitespace {
    /// Whitespace is collapsed when parsing
    Normal,
    /// Whitespace is preserved verbatim, as inside `<pre>`
    Pre,
}

/// A description of a node type, used when defining a schema.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct NodeSpec {
    /// The content expression for this node type
    pub content: Option<String>,
    /// The marks that are allowed inside of this node, as a space-separated
    /// string of mark names or groups, `"_"` for all, or `""` for none
    pub marks: Option<String>,
    /// The groups this node type belongs to, space-separated
    pub group: Option<String>,
    /// Whether this is an inline node (text is inline implicitly)
    pub inline: bool,
    /// Can be set for non-leaf nodes that should be treated as a single unit
    pub atom: bool,
    /// The attributes this node type declares
    pub attrs: IndexMap<String, AttributeSpec>,
    /// Controls whether nodes of this type can be selected as a node
    /// selection (defaults to true for non-text nodes)
    pub selectable: Option<bool>,
    /// Whether nodes of this type can be dragged without being selected
    pub draggable: bool,
    /// Whether this block contains code, which causes its whitespace to be
    /// preserved
    pub code: bool,
    /// Overrides the whitespace policy derived from `code`
    pub whitespace: Option<Whitespace>,
    /// When enabled, the node is preserved as the parent of replaced content
    /// where possible
    pub defining: bool,
    /// When enabled, the sides of nodes of this type count as boundaries that
    /// regular editing operations won't cross
    pub isolating: bool,
    /// Produces the output template used to serialize nodes of this type
    #[derivative(Debug = "ignore")]
    pub to_dom: Option<NodeToDom>,
    /// The rules by which such nodes are recognized in a source tree
    pub parse_dom: Vec<ParseRule>,
    /// Projects leaf nodes of this type to text
    #[derivative(Debug = "ignore")]
    pub leaf_text: Option<LeafText>,
}

/// A description of a mark type, used when defining a schema.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct MarkSpec {
    /// The attributes this mark type declares
    pub attrs: IndexMap<String, AttributeSpec>,
    /// Whether the mark is included when the cursor sits at its end
    /// (defaults to true)
    pub inclusive: Option<bool>,
    /// The marks that this mark may not coexist with, as a space-separated
    /// string of names or groups; `"_"` excludes everything and the default
    /// excludes only the mark itself
    pub excludes: Option<String>,
    /// The groups this mark type belongs to, space-separated
    pub group: Option<String>,
    /// Whether the mark can span multiple nodes when serialized
    /// (defaults to true)
    pub spanning: Option<bool>,
    /// Produces the output template used to serialize this mark
    #[derivative(Debug = "ignore")]
    pub to_dom: Option<MarkToDom>,
    /// The rules by which this mark is recognized in a source tree
    pub parse_dom: Vec<ParseRule>,
}

/// An object describing a schema.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct SchemaSpec {
    /// The node types in this schema; order is significant (it determines
    /// which parse rules take precedence by default, and which nodes come
    /// first in a group)
    pub nodes: IndexMap<String, NodeSpec>,
    /// The mark types, in rank order
    pub marks: IndexMap<String, MarkSpec>,
    /// The name of the default top-level node (`"doc"` unless set)
    pub top_node: Option<String>,
}

/// Errors raised when compiling a schema
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum SchemaError {
    /// `{0}` can not be both a node and a mark
    NameConflict(String),
    /// Schema is missing its top node type (`{0}`)
    MissingTopNode(String),
    /// Every schema needs a 'text' type
    MissingTextType,
    /// The text node type should not have attributes
    TextTypeAttrs,
    /// Invalid content expression for `{name}`: {source}
    Content {
        /// The node type whose expression failed to compile
        name: String,
        /// The compilation failure
        #[source]
        source: ContentError,
    },
    /// Unknown mark type `{name}` referenced from `{referenced_from}`
    UnknownMark {
        /// The name that did not resolve
        name: String,
        /// The node or mark spec that referenced it
        referenced_from: String,
    },
}

/// Errors raised when constructing nodes and marks through a schema
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum CreateError {
    /// {0}
    Attr(#[from] AttrError),
    /// NodeType.create can't construct text nodes
    TextNodeType,
    /// Invalid content for node `{0}`
    InvalidContent(String),
    /// Unknown node type: `{0}`
    UnknownNodeType(String),
    /// Unknown mark type: `{0}`
    UnknownMarkType(String),
}

pub(crate) struct NodeTypeData {
    pub(crate) name: String,
    pub(crate) groups: Vec<String>,
    pub(crate) default_attrs: Option<Attrs>,
    pub(crate) inline: bool,
    pub(crate) leaf: bool,
    pub(crate) inline_content: bool,
    pub(crate) content_match: Arc<MatchArena>,
    /// Allowed mark type indices; `None` means all marks are allowed
    pub(crate) mark_set: Option<Vec<usize>>,
    pub(crate) spec: NodeSpec,
}

impl NodeTypeData {
    pub(crate) fn is_text(&self) -> bool {
        self.name == "text"
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub(crate) fn has_required_attrs(&self) -> bool {
        self.spec.attrs.values().any(AttributeSpec::is_required)
    }
}

pub(crate) struct MarkTypeData {
    pub(crate) name: String,
    pub(crate) default_attrs: Option<Attrs>,
    /// Excluded mark types, indexed by mark rank
    pub(crate) excluded: Vec<bool>,
    pub(crate) spec: MarkSpec,
}

pub(crate) struct SchemaData {
    pub(crate) nodes: Vec<NodeTypeData>,
    pub(crate) marks: Vec<MarkTypeData>,
    pub(crate) node_index: HashMap<String, usize>,
    pub(crate) mark_index: HashMap<String, usize>,
    pub(crate) top_node: usize,
    /// `find_wrapping` results, keyed by (match arena, state, target type)
    pub(crate) wrap_cache: Mutex<HashMap<(usize, usize, usize), Option<Vec<usize>>>>,
    /// Scratch space for modules that want to attach per-schema values
    pub(crate) cached: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

/// A document schema. Holds node and mark type objects for the nodes and
/// marks that may occur in conforming documents, and provides functionality
/// for creating and deserializing such documents.
///
/// Cloning a schema is cheap; all clones share the compiled type arenas.
#[derive(Clone)]
pub struct Schema {
    pub(crate) data: Arc<SchemaData>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for Schema {}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field(
                "nodes",
                &self.data.nodes.iter().map(|n| &n.name).collect::<Vec<_>>(),
            )
            .field(
                "marks",
                &self.data.marks.iter().map(|m| &m.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Schema {
    /// Compile a schema from a spec.
    pub fn new(spec: SchemaSpec) -> Result<Schema, SchemaError> {
        let top_name = spec.top_node.clone().unwrap_or_else(|| "doc".to_owned());

        for name in spec.nodes.keys() {
            if spec.marks.contains_key(name) {
                return Err(SchemaError::NameConflict(name.clone()));
            }
        }
        if !spec.nodes.contains_key("text") {
            return Err(SchemaError::MissingTextType);
        }
        if !spec.nodes["text"].attrs.is_empty() {
            return Err(SchemaError::TextTypeAttrs);
        }
        let top_node = spec
            .nodes
            .get_index_of(&top_name)
            .ok_or(SchemaError::MissingTopNode(top_name))?;

        // Marks first: their ranks are needed nowhere during node compilation,
        // but their names are resolved by node `marks` expressions.
        let mut marks: Vec<MarkTypeData> = spec
            .marks
            .into_iter()
            .map(|(name, mark_spec)| MarkTypeData {
                name,
                default_attrs: default_attrs(&mark_spec.attrs),
                excluded: Vec::new(),
                spec: mark_spec,
            })
            .collect();

        let metas: Vec<TypeMeta> = spec
            .nodes
            .iter()
            .map(|(name, node_spec)| TypeMeta {
                name: name.clone(),
                groups: split_names(node_spec.group.as_deref()),
                inline: node_spec.inline || name == "text",
                is_text: name == "text",
                has_required_attrs: node_spec.attrs.values().any(AttributeSpec::is_required),
            })
            .collect();

        let mut expr_cache: HashMap<String, Arc<MatchArena>> = HashMap::new();
        let mut nodes: Vec<NodeTypeData> = Vec::with_capacity(spec.nodes.len());
        for (index, (name, node_spec)) in spec.nodes.into_iter().enumerate() {
            let expr = node_spec.content.clone().unwrap_or_default();
            let expr = expr.trim().to_owned();
            let content_match = match expr_cache.get(&expr) {
                Some(arena) => arena.clone(),
                None => {
                    let arena = Arc::new(content::compile(&expr, &metas).map_err(|source| {
                        SchemaError::Content {
                            name: name.clone(),
                            source,
                        }
                    })?);
                    expr_cache.insert(expr.clone(), arena.clone());
                    arena
                }
            };
            let leaf = expr.is_empty();
            let inline_content = content_match.states[0]
                .next
                .first()
                .map(|(type_index, _)| metas[*type_index].inline)
                .unwrap_or(false);
            let mark_set = match node_spec.marks.as_deref() {
                Some("_") => None,
                Some("") => Some(Vec::new()),
                Some(expr) => Some(gather_marks(&marks, expr, &name)?),
                None => {
                    if inline_content {
                        None
                    } else {
                        Some(Vec::new())
                    }
                }
            };
            nodes.push(NodeTypeData {
                name,
                groups: metas[index].groups.clone(),
                default_attrs: default_attrs(&node_spec.attrs),
                inline: metas[index].inline,
                leaf,
                inline_content,
                content_match,
                mark_set,
                spec: node_spec,
            });
        }

        let mark_count = marks.len();
        for index in 0..mark_count {
            let excluded = match marks[index].spec.excludes.clone() {
                None => {
                    let mut excluded = vec![false; mark_count];
                    excluded[index] = true;
                    excluded
                }
                Some(expr) if expr.trim().is_empty() => vec![false; mark_count],
                Some(expr) => {
                    let name = marks[index].name.clone();
                    let gathered = gather_marks(&marks, &expr, &name)?;
                    let mut excluded = vec![false; mark_count];
                    for mark in gathered {
                        excluded[mark] = true;
                    }
                    excluded
                }
            };
            marks[index].excluded = excluded;
        }

        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(index, data)| (data.name.clone(), index))
            .collect();
        let mark_index = marks
            .iter()
            .enumerate()
            .map(|(index, data)| (data.name.clone(), index))
            .collect();

        Ok(Schema {
            data: Arc::new(SchemaData {
                nodes,
                marks,
                node_index,
                mark_index,
                top_node,
                wrap_cache: Mutex::new(HashMap::new()),
                cached: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Get the node type with the given name, if it exists in this schema.
    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.data
            .node_index
            .get(name)
            .map(|index| self.node_type_at(*index))
    }

    /// Get the mark type with the given name, if it exists in this schema.
    pub fn mark_type(&self, name: &str) -> Option<MarkType> {
        self.data
            .mark_index
            .get(name)
            .map(|index| self.mark_type_at(*index))
    }

    pub(crate) fn node_type_at(&self, index: usize) -> NodeType {
        NodeType {
            schema: self.clone(),
            index,
        }
    }

    pub(crate) fn mark_type_at(&self, index: usize) -> MarkType {
        MarkType {
            schema: self.clone(),
            index,
        }
    }

    /// The type of the schema's top node.
    pub fn top_node_type(&self) -> NodeType {
        self.node_type_at(self.data.top_node)
    }

    /// All node types, in declaration order.
    pub fn node_types(&self) -> Vec<NodeType> {
        (0..self.data.nodes.len())
            .map(|index| self.node_type_at(index))
            .collect()
    }

    /// All mark types, in rank order.
    pub fn mark_types(&self) -> Vec<MarkType> {
        (0..self.data.marks.len())
            .map(|index| self.mark_type_at(index))
            .collect()
    }

    /// Create a node in this schema. Content may be a fragment, a node, a
    /// vector of nodes, or `()`.
    pub fn node<F: Into<Fragment>>(
        &self,
        name: &str,
        attrs: Option<&Attrs>,
        content: F,
        marks: Option<MarkSet>,
    ) -> Result<Node, CreateError> {
        let r#type = self
            .node_type(name)
            .ok_or_else(|| CreateError::UnknownNodeType(name.to_owned()))?;
        r#type.create(attrs, content, marks)
    }

    /// Create a text node in the schema. This method is the only way to
    /// create text nodes. Panics when given an empty string; empty text
    /// nodes are not allowed.
    pub fn text<T: Into<String>>(&self, text: T) -> Node {
        self.text_with_marks(text, MarkSet::default())
    }

    /// Create a text node carrying the given marks. Panics when given an
    /// empty string.
    pub fn text_with_marks<T: Into<String>>(&self, text: T, marks: MarkSet) -> Node {
        let text = text.into();
        assert!(!text.is_empty(), "Empty text nodes are not allowed");
        let index = self.data.node_index["text"];
        Node::new_text(self.node_type_at(index), text, marks)
    }

    /// Create a mark with the given name and attributes.
    pub fn mark(&self, name: &str, attrs: Option<&Attrs>) -> Result<Mark, CreateError> {
        let r#type = self
            .mark_type(name)
            .ok_or_else(|| CreateError::UnknownMarkType(name.to_owned()))?;
        Ok(r#type.create(attrs)?)
    }

    /// Look up a value attached to the schema by a downstream module.
    pub fn cached(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.data.cached.lock().unwrap().get(key).cloned()
    }

    /// Attach a value to the schema for reuse by downstream modules.
    pub fn set_cached(&self, key: &str, value: Arc<dyn Any + Send + Sync>) {
        self.data
            .cached
            .lock()
            .unwrap()
            .insert(key.to_owned(), value);
    }
}

fn split_names(src: Option<&str>) -> Vec<String> {
    src.map(|s| s.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Resolve a space-separated list of mark names, groups, or `"_"` to mark
/// type indices.
fn gather_marks(
    marks: &[MarkTypeData],
    expr: &str,
    referenced_from: &str,
) -> Result<Vec<usize>, SchemaError> {
    let mut found = Vec::new();
    for name in expr.split_whitespace() {
        let mut ok = false;
        if let Some(index) = marks.iter().position(|mark| mark.name == name) {
            found.push(index);
            ok = true;
        } else {
            for (index, mark) in marks.iter().enumerate() {
                if name == "_"
                    || mark
                        .spec
                        .group
                        .as_deref()
                        .map_or(false, |groups| groups.split_whitespace().any(|g| g == name))
                {
                    found.push(index);
                    ok = true;
                }
            }
        }
        if !ok {
            return Err(SchemaError::UnknownMark {
                name: name.to_owned(),
                referenced_from: referenced_from.to_owned(),
            });
        }
    }
    Ok(found)
}

/// Node types are objects allocated once per schema and used to tag `Node`
/// instances. They contain information about the node type, such as its name
/// and what kind of node it represents.
#[derive(Clone)]
pub struct NodeType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.index == other.index
    }
}

impl Eq for NodeType {}

impl Hash for NodeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.schema.data) as usize).hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({})", self.name())
    }
}

impl NodeType {
    pub(crate) fn data(&self) -> &NodeTypeData {
        &self.schema.data.nodes[self.index]
    }

    /// The name the node type has in this schema.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// A link back to the schema the node type belongs to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The spec that this type is based on.
    pub fn spec(&self) -> &NodeSpec {
        &self.data().spec
    }

    /// The groups this node type belongs to.
    pub fn groups(&self) -> &[String] {
        &self.data().groups
    }

    /// True if this is the text node type.
    pub fn is_text(&self) -> bool {
        self.data().is_text()
    }

    /// True if this is an inline type.
    pub fn is_inline(&self) -> bool {
        self.data().inline
    }

    /// True if this is a block type.
    pub fn is_block(&self) -> bool {
        !self.data().inline
    }

    /// True for node types that allow no content.
    pub fn is_leaf(&self) -> bool {
        self.data().leaf
    }

    /// True when this node is an atom, i.e. when it does not have directly
    /// editable content.
    pub fn is_atom(&self) -> bool {
        self.is_leaf() || self.data().spec.atom
    }

    /// True if this is a textblock type, a block that contains inline
    /// content.
    pub fn is_textblock(&self) -> bool {
        self.is_block() && self.inline_content()
    }

    /// True if this node type has inline content.
    pub fn inline_content(&self) -> bool {
        self.data().inline_content
    }

    /// The whitespace policy for this type's content.
    pub fn whitespace(&self) -> Whitespace {
        self.data().spec.whitespace.unwrap_or(if self.data().spec.code {
            Whitespace::Pre
        } else {
            Whitespace::Normal
        })
    }

    /// Tells you whether this node type has any required attributes.
    pub fn has_required_attrs(&self) -> bool {
        self.data().has_required_attrs()
    }

    /// The attribute object available on all instances created without
    /// explicit attributes, or `None` when some attribute is required.
    pub fn default_attrs(&self) -> Option<&Attrs> {
        self.data().default_attrs.as_ref()
    }

    /// The starting match of the node type's content expression.
    pub fn content_match(&self) -> ContentMatch {
        ContentMatch::new(self.schema.clone(), self.data().content_match.clone(), 0)
    }

    /// Indicates whether this node type admits the same content as the other,
    /// so that nodes of the two types can be joined.
    pub fn compatible_content(&self, other: &NodeType) -> bool {
        self == other || self.content_match().compatible(&other.content_match())
    }

    /// Fill in an attribute map for this type, applying defaults.
    pub fn compute_attrs(&self, attrs: Option<&Attrs>) -> Result<Attrs, AttrError> {
        compute_attrs(&self.data().spec.attrs, attrs, &self.data().name)
    }

    /// Create a node of this type. Content is not validated beyond attribute
    /// checking; use [`NodeType::create_checked`] for a validated variant.
    pub fn create<F: Into<Fragment>>(
        &self,
        attrs: Option<&Attrs>,
        content: F,
        marks: Option<MarkSet>,
    ) -> Result<Node, CreateError> {
        if self.is_text() {
            return Err(CreateError::TextNodeType);
        }
        let attrs = self.compute_attrs(attrs)?;
        Ok(Node::new(
            self.clone(),
            attrs,
            content.into(),
            marks.unwrap_or_default(),
        ))
    }

    /// Like [`NodeType::create`], but check the given content against the
    /// node type's content restrictions, and fail if it doesn't match.
    pub fn create_checked<F: Into<Fragment>>(
        &self,
        attrs: Option<&Attrs>,
        content: F,
        marks: Option<MarkSet>,
    ) -> Result<Node, CreateError> {
        let content = content.into();
        if !self.valid_content(&content) {
            return Err(CreateError::InvalidContent(self.name().to_owned()));
        }
        self.create(attrs, content, marks)
    }

    /// Like [`NodeType::create`], but see if it is necessary to add nodes to
    /// the start or end of the given fragment to make it fit the node. If no
    /// fitting wrapping can be found, return `None`. Attribute failures also
    /// yield `None`.
    pub fn create_and_fill<F: Into<Fragment>>(
        &self,
        attrs: Option<&Attrs>,
        content: F,
        marks: Option<MarkSet>,
    ) -> Option<Node> {
        if self.is_text() {
            return None;
        }
        let attrs = self.compute_attrs(attrs).ok()?;
        let mut content: Fragment = content.into();
        if content.size() > 0 {
            let before = self.content_match().fill_before(&content, false, 0)?;
            content = before.append(content);
        }
        let matched = self.content_match().match_fragment(&content)?;
        let after = matched.fill_before(&Fragment::default(), true, 0)?;
        Some(Node::new(
            self.clone(),
            attrs,
            content.append(after),
            marks.unwrap_or_default(),
        ))
    }

    /// Returns true if the given fragment is valid content for this node
    /// type.
    pub fn valid_content(&self, content: &Fragment) -> bool {
        match self.content_match().match_fragment(content) {
            Some(result) if result.valid_end() => content
                .children()
                .iter()
                .all(|child| self.allows_marks(child.marks())),
            _ => false,
        }
    }

    /// Check whether the given mark type is allowed in this node.
    pub fn allows_mark_type(&self, mark_type: &MarkType) -> bool {
        match &self.data().mark_set {
            None => true,
            Some(set) => set.contains(&mark_type.index),
        }
    }

    /// Test whether the given set of marks are allowed in this node.
    pub fn allows_marks(&self, marks: &MarkSet) -> bool {
        marks.iter().all(|mark| self.allows_mark_type(&mark.r#type()))
    }

    /// Removes the marks that are not allowed in this node from the given
    /// set.
    pub fn allowed_marks(&self, marks: &MarkSet) -> MarkSet {
        if self.data().mark_set.is_none() {
            return marks.clone();
        }
        marks
            .iter()
            .filter(|mark| self.allows_mark_type(&mark.r#type()))
            .cloned()
            .collect()
    }
}

/// Like nodes, marks (which are associated with nodes to signify things like
/// emphasis or being part of a link) are tagged with type objects, which are
/// instantiated once per schema.
#[derive(Clone)]
pub struct MarkType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl PartialEq for MarkType {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.index == other.index
    }
}

impl Eq for MarkType {}

impl Hash for MarkType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.schema.data) as usize).hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkType({})", self.name())
    }
}

impl MarkType {
    pub(crate) fn data(&self) -> &MarkTypeData {
        &self.schema.data.marks[self.index]
    }

    /// The name of the mark type.
    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// A link back to the schema the mark type belongs to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The spec on which the type is based.
    pub fn spec(&self) -> &MarkSpec {
        &self.data().spec
    }

    /// The rank of this mark type; marks in a set are ordered by ascending
    /// rank.
    pub fn rank(&self) -> usize {
        self.index
    }

    /// Whether the mark is included when the cursor sits at its end.
    pub fn inclusive(&self) -> bool {
        self.data().spec.inclusive.unwrap_or(true)
    }

    /// Whether a single wrapper may span several adjacent nodes when the mark
    /// is serialized.
    pub fn spanning(&self) -> bool {
        self.data().spec.spanning.unwrap_or(true)
    }

    /// Create a mark of this type with the given attributes.
    pub fn create(&self, attrs: Option<&Attrs>) -> Result<Mark, AttrError> {
        let attrs = compute_attrs(&self.data().spec.attrs, attrs, &self.data().name)?;
        Ok(Mark::new(self.clone(), attrs))
    }

    /// Queries whether a given mark type is excluded by this one.
    pub fn excludes(&self, other: &MarkType) -> bool {
        self.data().excluded[other.index]
    }

    /// When there is a mark of this type in the given set, a reference to it
    /// is returned.
    pub fn is_in_set<'a>(&self, set: &'a MarkSet) -> Option<&'a Mark> {
        set.iter().find(|mark| &mark.r#type() == self)
    }

    /// Remove all marks of this type from the given set.
    pub fn remove_from_set(&self, set: &MarkSet) -> MarkSet {
        set.iter()
            .filter(|mark| &mark.r#type() != self)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::basic::schema;

    #[test]
    #[should_panic(expected = "Empty text nodes are not allowed")]
    fn empty_text_nodes_are_rejected() {
        schema().text("");
    }

    #[test]
    #[should_panic(expected = "Empty text nodes are not allowed")]
    fn empty_marked_text_nodes_are_rejected() {
        let em = schema().mark("em", None).unwrap();
        schema().text_with_marks("", em.into_set());
    }
}
