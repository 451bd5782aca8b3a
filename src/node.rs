//! # Document nodes

use crate::attrs::{AttrError, Attrs};
use crate::content::{ContentMatch, ContentMatchError};
use crate::fragment::Fragment;
use crate::mark::{Mark, MarkSet};
use crate::replace::{self, ReplaceError};
use crate::resolved_pos::{ResolveError, ResolvedPos};
use crate::schema::{CreateError, MarkType, NodeType, Schema};
use crate::slice::Slice;
use crate::text::Text;
use crate::util;
use displaydoc::Display;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when reading a document back from JSON
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum FromJsonError {
    /// Invalid input for Node.fromJSON
    InvalidNode,
    /// Invalid text node in JSON
    InvalidText,
    /// Invalid mark data in JSON
    InvalidMark,
    /// {0}
    Create(#[from] CreateError),
}

/// Errors raised by [`Node::check`]
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum CheckError {
    /// Invalid content for node `{name}`: {content}
    InvalidContent {
        /// The node type
        name: String,
        /// A rendering of the offending content
        content: String,
    },
    /// Invalid collection of marks for node `{name}`
    InvalidMarks {
        /// The node type
        name: String,
    },
    /// {0}
    Attr(#[from] AttrError),
}

#[derive(PartialEq)]
struct NodeData {
    r#type: NodeType,
    attrs: Attrs,
    content: Fragment,
    marks: MarkSet,
    text: Option<Text>,
}

/// This type represents a node in the tree that makes up a document. So a
/// document is an instance of `Node`, with children that are also instances
/// of `Node`.
///
/// Nodes are persistent data structures. Instead of changing them, you create
/// new ones with the content you want. Old ones keep pointing at the old
/// document shape. This is made cheaper by sharing structure between the old
/// and new data as much as possible; cloning a node only copies a pointer.
#[derive(Clone)]
pub struct Node {
    data: Arc<NodeData>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || *self.data == *other.data
    }
}

impl Node {
    pub(crate) fn new(r#type: NodeType, attrs: Attrs, content: Fragment, marks: MarkSet) -> Node {
        Node {
            data: Arc::new(NodeData {
                r#type,
                attrs,
                content,
                marks,
                text: None,
            }),
        }
    }

    pub(crate) fn new_text<T: Into<Text>>(r#type: NodeType, text: T, marks: MarkSet) -> Node {
        Node {
            data: Arc::new(NodeData {
                r#type,
                attrs: Attrs::new(),
                content: Fragment::default(),
                marks,
                text: Some(text.into()),
            }),
        }
    }

    /// The type of the node.
    pub fn r#type(&self) -> &NodeType {
        &self.data.r#type
    }

    /// The schema this node belongs to.
    pub fn schema(&self) -> &Schema {
        self.data.r#type.schema()
    }

    /// An object mapping attribute names to values.
    pub fn attrs(&self) -> &Attrs {
        &self.data.attrs
    }

    /// A container holding the node's children.
    pub fn content(&self) -> &Fragment {
        &self.data.content
    }

    /// The marks (things like whether it is emphasized or part of a link)
    /// applied to this node.
    pub fn marks(&self) -> &MarkSet {
        &self.data.marks
    }

    /// For text nodes, this contains the node's text content.
    pub fn as_text(&self) -> Option<&Text> {
        self.data.text.as_ref()
    }

    /// The size of this node, as defined by the integer-based indexing
    /// scheme. For text nodes, this is the amount of UTF-16 code units. For
    /// other leaf nodes, it is one. For non-leaf nodes, it is the size of the
    /// content plus two (the start and end token).
    pub fn node_size(&self) -> usize {
        if let Some(text) = &self.data.text {
            text.len_utf16()
        } else if self.is_leaf() {
            1
        } else {
            self.data.content.size() + 2
        }
    }

    /// The size of the node's content.
    pub fn content_size(&self) -> usize {
        self.data.content.size()
    }

    /// The number of children that the node has.
    pub fn child_count(&self) -> usize {
        self.data.content.child_count()
    }

    /// Get the child node at the given index. Panics when the index is out of
    /// range.
    pub fn child(&self, index: usize) -> &Node {
        self.data.content.child(index)
    }

    /// Get the child node at the given index, if it exists.
    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.data.content.maybe_child(index)
    }

    /// Returns this node's first child, or `None` if there are no children.
    pub fn first_child(&self) -> Option<&Node> {
        self.data.content.first_child()
    }

    /// Returns this node's last child, or `None` if there are no children.
    pub fn last_child(&self) -> Option<&Node> {
        self.data.content.last_child()
    }

    /// True when this is a block (non-inline) node.
    pub fn is_block(&self) -> bool {
        self.data.r#type.is_block()
    }

    /// True when this is an inline node (a text node or a node that can
    /// appear among text).
    pub fn is_inline(&self) -> bool {
        self.data.r#type.is_inline()
    }

    /// True when this is a text node.
    pub fn is_text(&self) -> bool {
        self.data.text.is_some()
    }

    /// True when this is a textblock node, a block node with inline content.
    pub fn is_textblock(&self) -> bool {
        self.data.r#type.is_textblock()
    }

    /// True when this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.data.r#type.is_leaf()
    }

    /// True when this is an atom, i.e. when it does not have directly
    /// editable content.
    pub fn is_atom(&self) -> bool {
        self.data.r#type.is_atom()
    }

    /// The child node before the given offset, along with its index and the
    /// offset at which it starts. If the offset points into a text node, that
    /// node is returned whole.
    pub fn child_before(&self, pos: usize) -> Option<(&Node, usize, usize)> {
        if pos == 0 {
            return None;
        }
        let index = self.data.content.find_index(pos, false).ok()?;
        if index.offset < pos {
            return Some((self.child(index.index), index.index, index.offset));
        }
        let node = self.child(index.index - 1);
        Some((node, index.index - 1, index.offset - node.node_size()))
    }

    /// The child node after the given offset, along with its index and start
    /// offset.
    pub fn child_after(&self, pos: usize) -> Option<(&Node, usize, usize)> {
        let index = self.data.content.find_index(pos, false).ok()?;
        let node = self.maybe_child(index.index)?;
        Some((node, index.index, index.offset))
    }

    /// Create a new node with the same markup as this node, containing the
    /// content produced by applying `map` to this node's content. For text
    /// nodes the mapping is ignored and the node itself is returned.
    pub fn copy<F>(&self, map: F) -> Node
    where
        F: FnOnce(&Fragment) -> Fragment,
    {
        if self.is_text() {
            return self.clone();
        }
        Node::new(
            self.data.r#type.clone(),
            self.data.attrs.clone(),
            map(&self.data.content),
            self.data.marks.clone(),
        )
    }

    /// Create a copy of this node, with the given set of marks instead of the
    /// node's own marks.
    pub fn mark(&self, marks: MarkSet) -> Node {
        if marks == self.data.marks {
            return self.clone();
        }
        Node {
            data: Arc::new(NodeData {
                r#type: self.data.r#type.clone(),
                attrs: self.data.attrs.clone(),
                content: self.data.content.clone(),
                marks,
                text: self.data.text.clone(),
            }),
        }
    }

    pub(crate) fn with_text(&self, text: Text) -> Node {
        Node {
            data: Arc::new(NodeData {
                r#type: self.data.r#type.clone(),
                attrs: self.data.attrs.clone(),
                content: Fragment::default(),
                marks: self.data.marks.clone(),
                text: Some(text),
            }),
        }
    }

    /// Create a copy of this node with only the content between the given
    /// positions.
    pub fn cut<R: RangeBounds<usize>>(&self, range: R) -> Cow<Node> {
        let from = util::from(&range);

        if let Some(text) = &self.data.text {
            let len = text.len_utf16();
            let to = util::to(&range, len);

            if from == 0 && to == len {
                return Cow::Borrowed(self);
            }
            Cow::Owned(self.with_text(text.cut(from, to)))
        } else {
            let content_size = self.content_size();
            let to = util::to(&range, content_size);

            if from == 0 && to == content_size {
                Cow::Borrowed(self)
            } else {
                Cow::Owned(self.copy(|c| c.cut(from..to)))
            }
        }
    }

    /// Cut out the part of the document between the given positions, and
    /// return it as a `Slice` object.
    pub fn slice<R: RangeBounds<usize>>(
        &self,
        range: R,
        include_parents: bool,
    ) -> Result<Slice, ResolveError> {
        let from = util::from(&range);
        let to = util::to(&range, self.node_size());

        if from == to {
            return Ok(Slice::default());
        }

        let rp_from = self.resolve(from)?;
        let rp_to = self.resolve(to)?;

        let depth = if include_parents {
            0
        } else {
            rp_from.shared_depth(to)
        };

        let (start, node) = (rp_from.start(depth), rp_from.node(depth));
        let content = node.content().cut(rp_from.pos() - start..rp_to.pos() - start);
        Ok(Slice::new(
            content,
            rp_from.depth() - depth,
            rp_to.depth() - depth,
        ))
    }

    /// Replace the part of the document between the given positions with the
    /// given slice. The slice must 'fit', meaning its open sides must be able
    /// to connect to the surrounding content, and its content nodes must be
    /// valid children for the node they are placed into. If any of this is
    /// violated, an error of type [`ReplaceError`] is returned.
    pub fn replace<R: RangeBounds<usize>>(
        &self,
        range: R,
        slice: &Slice,
    ) -> Result<Node, ReplaceError> {
        let from = util::from(&range);
        let to = util::to(&range, self.node_size());

        let rp_from = self.resolve(from)?;
        let rp_to = self.resolve(to)?;

        replace::replace(&rp_from, &rp_to, slice)
    }

    /// Resolve the given position in the document, returning a struct with
    /// information about its context.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, ResolveError> {
        ResolvedPos::resolve(self, pos)
    }

    /// Invoke a callback for all descendant nodes recursively between the
    /// given two positions that are relative to start of this node's content.
    /// The callback is invoked with the node and its position relative to the
    /// original node (method receiver); it doesn't descend into a node when
    /// the callback returns `false`.
    pub fn nodes_between<F: FnMut(&Node, usize) -> bool>(&self, from: usize, to: usize, f: &mut F) {
        self.data.content.nodes_between(from, to, f, 0);
    }

    /// Call the given callback for every descendant node.
    pub fn descendants<F: FnMut(&Node, usize) -> bool>(&self, f: &mut F) {
        self.nodes_between(0, self.content_size(), f);
    }

    /// Concatenates all the text nodes found in this node and its children.
    pub fn text_content(&self) -> String {
        if let Some(text) = &self.data.text {
            return text.as_str().to_owned();
        }
        if self.is_leaf() {
            if let Some(leaf_text) = &self.r#type().spec().leaf_text {
                return leaf_text(self);
            }
            return String::new();
        }
        self.text_between(0, self.content_size(), Some(""), None)
    }

    /// Get all text between positions `from` and `to`, inserting
    /// `block_separator` between blocks and `leaf_text` for non-text leaves.
    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        if let Some(text) = &self.data.text {
            return text.cut(from, to).as_str().to_owned();
        }
        self.data
            .content
            .text_between(from, to, block_separator, leaf_text)
    }

    /// Compare the markup (type, attributes, and marks) of this node to those
    /// of another. Returns true if both have the same markup.
    pub fn same_markup(&self, other: &Node) -> bool {
        self.has_markup(&other.data.r#type, &other.data.attrs, &other.data.marks)
    }

    /// Check whether this node's markup correspond to the given type,
    /// attributes, and marks.
    pub fn has_markup(&self, r#type: &NodeType, attrs: &Attrs, marks: &MarkSet) -> bool {
        &self.data.r#type == r#type && &self.data.attrs == attrs && &self.data.marks == marks
    }

    /// Test whether a given mark type is in the given range.
    pub fn range_has_mark(&self, from: usize, to: usize, r#type: &MarkType) -> bool {
        let mut found = false;
        if to > from {
            self.nodes_between(from, to, &mut |node, _| {
                if r#type.is_in_set(node.marks()).is_some() {
                    found = true;
                }
                !found
            });
        }
        found
    }

    /// Get the content match in this node at the given index.
    pub fn content_match_at(&self, index: usize) -> Result<ContentMatch, ContentMatchError> {
        self.data
            .r#type
            .content_match()
            .match_fragment_range(&self.data.content, 0..index)
            .ok_or(ContentMatchError::InvalidContent)
    }

    /// Test whether replacing the range between two child indices (not
    /// positions) by the given replacement fragment (which defaults to the
    /// empty fragment) would leave the node's content valid. You can
    /// optionally pass `start` and `end` indices into the replacement
    /// fragment.
    pub fn can_replace<R: RangeBounds<usize>>(
        &self,
        from: usize,
        to: usize,
        replacement: Option<&Fragment>,
        range: R,
    ) -> bool {
        let empty = Fragment::default();
        let replacement = replacement.unwrap_or(&empty);
        let start = util::from(&range);
        let end = util::to(&range, replacement.child_count());

        let one = match self.content_match_at(from) {
            Ok(m) => m.match_fragment_range(replacement, start..end),
            Err(_) => return false,
        };
        let two = one.and_then(|m| m.match_fragment_range(&self.data.content, to..));
        match two {
            Some(m) if m.valid_end() => (start..end)
                .all(|i| self.data.r#type.allows_marks(replacement.child(i).marks())),
            _ => false,
        }
    }

    /// Test whether replacing the range between two child indices with a node
    /// of the given type would leave the node's content valid.
    pub fn can_replace_with(
        &self,
        from: usize,
        to: usize,
        r#type: &NodeType,
        marks: Option<&MarkSet>,
    ) -> bool {
        if matches!(marks, Some(marks) if !self.data.r#type.allows_marks(marks)) {
            return false;
        }
        let start = match self.content_match_at(from) {
            Ok(m) => m.match_type(r#type),
            Err(_) => return false,
        };
        let end = start.and_then(|m| m.match_fragment_range(&self.data.content, to..));
        matches!(end, Some(m) if m.valid_end())
    }

    /// Test whether the given node's content could be appended to this node.
    pub fn can_append(&self, other: &Node) -> bool {
        if other.child_count() > 0 {
            self.can_replace(self.child_count(), self.child_count(), Some(other.content()), ..)
        } else {
            true
        }
    }

    /// Check whether this node and its descendants conform to the schema.
    pub fn check(&self) -> Result<(), CheckError> {
        if !self.data.r#type.valid_content(&self.data.content) {
            return Err(CheckError::InvalidContent {
                name: self.data.r#type.name().to_owned(),
                content: self.data.content.to_string(),
            });
        }
        if !self.is_text() {
            self.data.r#type.compute_attrs(Some(&self.data.attrs))?;
        }
        let mut copy = MarkSet::default();
        for mark in &self.data.marks {
            mark.r#type()
                .create(Some(mark.attrs()))
                .map_err(CheckError::Attr)?;
            copy.add(mark);
        }
        if &copy != &self.data.marks {
            return Err(CheckError::InvalidMarks {
                name: self.data.r#type.name().to_owned(),
            });
        }
        for child in self.data.content.children() {
            child.check()?;
        }
        Ok(())
    }

    /// Deserialize a node from its JSON representation.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Node, FromJsonError> {
        let obj = json.as_object().ok_or(FromJsonError::InvalidNode)?;
        let marks = match obj.get("marks") {
            Some(value) => Some(MarkSet::from_json(schema, value)?),
            None => None,
        };
        let name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FromJsonError::InvalidNode)?;
        if name == "text" {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .ok_or(FromJsonError::InvalidText)?;
            return Ok(schema.text_with_marks(text, marks.unwrap_or_default()));
        }
        let content = Fragment::from_json(schema, obj.get("content").unwrap_or(&Value::Null))?;
        let attrs = match obj.get("attrs") {
            Some(Value::Object(attrs)) => Some(attrs.clone()),
            Some(Value::Null) | None => None,
            Some(_) => return Err(FromJsonError::InvalidNode),
        };
        let node = schema.node(name, attrs.as_ref(), content, marks)?;
        Ok(node)
    }

    /// The JSON representation of this node.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("node serialization is infallible")
    }
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.data.r#type.name())?;
        if !self.data.attrs.is_empty() {
            map.serialize_entry("attrs", &self.data.attrs)?;
        }
        if let Some(text) = &self.data.text {
            map.serialize_entry("text", text)?;
        }
        if self.data.content.child_count() > 0 {
            map.serialize_entry("content", &self.data.content)?;
        }
        if !self.data.marks.is_empty() {
            map.serialize_entry("marks", &self.data.marks)?;
        }
        map.end()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if let Some(text) = &self.data.text {
            format!("{:?}", text.as_str())
        } else if self.data.content.child_count() > 0 {
            format!("{}({})", self.data.r#type.name(), self.data.content)
        } else {
            self.data.r#type.name().to_owned()
        };
        let mut wrapped = base;
        for mark in self.data.marks.iter().rev() {
            wrapped = format!("{}({})", mark.r#type().name(), wrapped);
        }
        f.write_str(&wrapped)
    }
}
