//! # Fragments

use crate::node::{FromJsonError, Node};
use crate::schema::Schema;
use crate::util;
use displaydoc::Display;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::ops::RangeBounds;
use thiserror::Error;

/// Error for out-of-range offsets into a fragment
#[derive(Debug, Copy, Clone, Error, Display, PartialEq, Eq)]
pub enum IndexError {
    /// Position {0} outside of fragment
    OutOfRange(usize),
}

/// The index of the child at (or surrounding) an offset, together with the
/// offset at which that child starts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, derive_new::new)]
pub(crate) struct Index {
    pub index: usize,
    pub offset: usize,
}

/// A fragment represents a node's collection of child nodes.
///
/// Like nodes, fragments are persistent data structures, and you should not
/// mutate them or their content. Rather, you create new instances whenever
/// needed. The API tries to make this easy.
#[derive(Clone, Default, PartialEq)]
pub struct Fragment {
    inner: Vec<Node>,
    size: usize,
}

impl Fragment {
    /// Create a new empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    /// The size of the fragment, which is the total of the size of its
    /// content nodes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get a slice of all child nodes
    pub fn children(&self) -> &[Node] {
        &self.inner[..]
    }

    /// The first child of the fragment wrapped in `Some`, or `None` if it is
    /// empty.
    pub fn first_child(&self) -> Option<&Node> {
        self.inner.first()
    }

    /// The last child of the fragment wrapped in `Some`, or `None` if it is
    /// empty.
    pub fn last_child(&self) -> Option<&Node> {
        self.inner.last()
    }

    /// The number of child nodes in this fragment.
    pub fn child_count(&self) -> usize {
        self.inner.len()
    }

    /// Get the child node at the given index. Panics when the index is out of
    /// range.
    pub fn child(&self, index: usize) -> &Node {
        &self.inner[index]
    }

    /// Get the child node at the given index, if it exists.
    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.inner.get(index)
    }

    /// Create a new fragment containing the combined content of this fragment
    /// and the other. Adjacent text nodes with identical marks are merged.
    pub fn append(mut self, mut other: Self) -> Self {
        if let Some(first) = other.first_child() {
            if let Some(last) = self.inner.last_mut() {
                if let (Some(last_text), Some(first_text)) = (last.as_text(), first.as_text()) {
                    if last.marks() == first.marks() {
                        let merged = last.with_text(last_text.join(first_text));
                        *last = merged;
                        other.inner.remove(0);
                    }
                }

                self.inner.append(&mut other.inner);
                self.size += other.size;
                self
            } else {
                other
            }
        } else {
            self
        }
    }

    /// Create a new fragment with the given node prepended.
    pub fn add_to_start(self, node: Node) -> Self {
        Fragment::from(vec![node]).append(self)
    }

    /// Create a new fragment with the given node appended.
    pub fn add_to_end(self, node: Node) -> Self {
        self.append(Fragment::from(vec![node]))
    }

    /// Cut out the sub-fragment between the two given positions, splitting
    /// text nodes on the boundaries.
    pub fn cut<R: RangeBounds<usize>>(&self, range: R) -> Self {
        let from = util::from(&range);
        let to = util::to(&range, self.size);

        if from == 0 && to == self.size {
            return self.clone();
        }

        let mut result = vec![];
        let mut size = 0;
        if to > from {
            let mut pos = 0;
            let mut i = 0;
            while pos < to {
                let child = &self.inner[i];
                let end = pos + child.node_size();
                if end > from {
                    let new_child = if pos < from || end > to {
                        if let Some(text) = child.as_text() {
                            let len = text.len_utf16();
                            let start = from.saturating_sub(pos);
                            let end = usize::min(len, to - pos);
                            child.cut(start..end)
                        } else {
                            let t = pos + 1;
                            let start = from.saturating_sub(t);
                            let end = usize::min(child.content_size(), to.saturating_sub(t));
                            child.cut(start..end)
                        }
                        .into_owned()
                    } else {
                        child.clone()
                    };
                    size += new_child.node_size();
                    result.push(new_child);
                }
                pos = end;
                i += 1;
            }
        }
        Fragment {
            inner: result,
            size,
        }
    }

    /// Create a new fragment containing only the children between the two
    /// given child indices.
    pub fn cut_by_index(&self, from: usize, to: usize) -> Self {
        if from == to {
            return Fragment::default();
        }
        Fragment::from(self.inner[from..to].to_vec())
    }

    /// Create a new fragment in which the node at the given index is replaced
    /// by the given node.
    pub fn replace_child(&self, index: usize, node: Node) -> Cow<Self> {
        let current = &self.inner[index];
        if *current == node {
            Cow::Borrowed(self)
        } else {
            let size = self.size + node.node_size() - current.node_size();
            let mut copy = self.inner.clone();
            copy[index] = node;
            Cow::Owned(Fragment { inner: copy, size })
        }
    }

    /// Invoke a callback for all descendant nodes between the given two
    /// positions (relative to start of this fragment). Doesn't descend into a
    /// node when the callback returns `false`.
    pub fn nodes_between<F: FnMut(&Node, usize) -> bool>(
        &self,
        from: usize,
        to: usize,
        f: &mut F,
        node_start: usize,
    ) {
        let mut pos = 0;
        for child in &self.inner {
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos) && !child.is_leaf() {
                let start = pos + 1;
                child.content().nodes_between(
                    from.saturating_sub(start),
                    usize::min(child.content_size(), to.saturating_sub(start)),
                    f,
                    node_start + start,
                )
            }
            pos = end;
        }
    }

    /// Get all text between positions `from` and `to`. When `block_separator`
    /// is given, it is inserted to separate text of different block nodes,
    /// and `leaf_text` (or the node type's `leaf_text` spec) stands in for
    /// non-text leaf nodes.
    pub fn text_between(
        &self,
        from: usize,
        to: usize,
        block_separator: Option<&str>,
        leaf_text: Option<&str>,
    ) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(
            from,
            to,
            &mut |node, pos| {
                let node_text = if let Some(txt) = node.as_text() {
                    let start = from.saturating_sub(pos);
                    let end = usize::min(txt.len_utf16(), to - pos);
                    txt.cut(start, end).as_str().to_owned()
                } else if !node.is_leaf() {
                    String::new()
                } else if let Some(leaf_text) = leaf_text {
                    leaf_text.to_owned()
                } else if let Some(projection) = &node.r#type().spec().leaf_text {
                    projection(node)
                } else {
                    String::new()
                };
                if let Some(separator) = block_separator {
                    if node.is_block()
                        && ((node.is_leaf() && !node_text.is_empty()) || node.is_textblock())
                    {
                        if first {
                            first = false;
                        } else {
                            text.push_str(separator);
                        }
                    }
                }
                text.push_str(&node_text);
                true
            },
            0,
        );
        text
    }

    /// Find the first position at which this fragment and another fragment
    /// differ, or `None` if they are the same.
    pub fn find_diff_start(&self, other: &Fragment) -> Option<usize> {
        find_diff_start(self, other, 0)
    }

    /// Find the first position, searching from the end, at which this
    /// fragment and the given fragment differ, or `None` when they are the
    /// same. Since this position will not be the same in both nodes, an
    /// object with two separate positions is returned.
    pub fn find_diff_end(&self, other: &Fragment) -> Option<(usize, usize)> {
        find_diff_end(self, other, self.size, other.size)
    }

    /// Find the child at the given offset.
    ///
    /// With `round` set, an offset on a child boundary resolves to the index
    /// after the boundary.
    pub(crate) fn find_index(&self, pos: usize, round: bool) -> Result<Index, IndexError> {
        let len = self.inner.len();
        match pos {
            0 => Ok(Index::new(0, pos)),
            p if p == self.size => Ok(Index::new(len, pos)),
            p if p > self.size => Err(IndexError::OutOfRange(pos)),
            p => {
                let mut cur_pos = 0;
                for (i, cur) in self.inner.iter().enumerate() {
                    let end = cur_pos + cur.node_size();
                    if end >= p {
                        if end == p || round {
                            return Ok(Index::new(i + 1, end));
                        } else {
                            return Ok(Index::new(i, cur_pos));
                        }
                    }
                    cur_pos = end;
                }
                unreachable!("self.size must be the sum of all node sizes")
            }
        }
    }

    /// Deserialize a fragment from a JSON array of nodes.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Fragment, FromJsonError> {
        match json {
            Value::Null => Ok(Fragment::default()),
            Value::Array(children) => {
                let mut nodes = Vec::with_capacity(children.len());
                for child in children {
                    nodes.push(Node::from_json(schema, child)?);
                }
                Ok(Fragment::from(nodes))
            }
            _ => Err(FromJsonError::InvalidNode),
        }
    }

    /// The JSON representation of this fragment.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("fragment serialization is infallible")
    }
}

fn find_diff_start(a: &Fragment, b: &Fragment, pos: usize) -> Option<usize> {
    let mut pos = pos;
    for i in 0.. {
        if i == a.child_count() || i == b.child_count() {
            return if a.child_count() == b.child_count() {
                None
            } else {
                Some(pos)
            };
        }
        let (child_a, child_b) = (a.child(i), b.child(i));
        if child_a == child_b {
            pos += child_a.node_size();
            continue;
        }
        if !child_a.same_markup(child_b) {
            return Some(pos);
        }
        match (child_a.as_text(), child_b.as_text()) {
            (Some(text_a), Some(text_b)) if text_a != text_b => {
                for (ca, cb) in text_a.as_str().chars().zip(text_b.as_str().chars()) {
                    if ca != cb {
                        break;
                    }
                    pos += ca.len_utf16();
                }
                return Some(pos);
            }
            _ => {}
        }
        if child_a.content_size() > 0 || child_b.content_size() > 0 {
            if let Some(inner) = find_diff_start(child_a.content(), child_b.content(), pos + 1) {
                return Some(inner);
            }
        }
        pos += child_a.node_size();
    }
    unreachable!()
}

fn find_diff_end(a: &Fragment, b: &Fragment, pos_a: usize, pos_b: usize) -> Option<(usize, usize)> {
    let (mut i_a, mut i_b) = (a.child_count(), b.child_count());
    let (mut pos_a, mut pos_b) = (pos_a, pos_b);
    loop {
        if i_a == 0 || i_b == 0 {
            return if i_a == i_b {
                None
            } else {
                Some((pos_a, pos_b))
            };
        }
        i_a -= 1;
        i_b -= 1;
        let (child_a, child_b) = (a.child(i_a), b.child(i_b));
        let size = child_a.node_size();
        if child_a == child_b {
            pos_a -= size;
            pos_b -= size;
            continue;
        }
        if !child_a.same_markup(child_b) {
            return Some((pos_a, pos_b));
        }
        match (child_a.as_text(), child_b.as_text()) {
            (Some(text_a), Some(text_b)) if text_a != text_b => {
                for (ca, cb) in text_a
                    .as_str()
                    .chars()
                    .rev()
                    .zip(text_b.as_str().chars().rev())
                {
                    if ca != cb {
                        break;
                    }
                    pos_a -= ca.len_utf16();
                    pos_b -= ca.len_utf16();
                }
                return Some((pos_a, pos_b));
            }
            _ => {}
        }
        if child_a.content_size() > 0 || child_b.content_size() > 0 {
            if let Some(inner) =
                find_diff_end(child_a.content(), child_b.content(), pos_a - 1, pos_b - 1)
            {
                return Some(inner);
            }
        }
        pos_a -= size;
        pos_b -= size;
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.inner).finish()
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for child in &self.inner {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", child)?;
        }
        Ok(())
    }
}

impl Serialize for Fragment {
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl From<Vec<Node>> for Fragment {
    /// Adjacent text nodes with identical marks are merged, so that a
    /// fragment never contains a mergeable text pair.
    fn from(src: Vec<Node>) -> Fragment {
        let mut inner: Vec<Node> = Vec::with_capacity(src.len());
        let mut size = 0;
        for node in src {
            size += node.node_size();
            let joined = match (inner.last(), node.as_text()) {
                (Some(last), Some(text)) if last.is_text() && last.marks() == node.marks() => {
                    Some(last.with_text(last.as_text().unwrap().join(text)))
                }
                _ => None,
            };
            match joined {
                Some(joined) => *inner.last_mut().unwrap() = joined,
                None => inner.push(node),
            }
        }
        Fragment { inner, size }
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Fragment {
        Fragment::from(vec![node])
    }
}

impl From<Option<Fragment>> for Fragment {
    fn from(src: Option<Fragment>) -> Fragment {
        src.unwrap_or_default()
    }
}

impl From<Fragment> for Vec<Node> {
    fn from(src: Fragment) -> Vec<Node> {
        src.inner
    }
}
