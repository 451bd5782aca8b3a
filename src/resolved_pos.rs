//! # Resolved positions

use crate::fragment::IndexError;
use crate::mark::MarkSet;
use crate::node::Node;
use derive_new::new;
use displaydoc::Display;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Errors at `resolve`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, Error)]
pub enum ResolveError {
    /// Position {pos} out of range
    RangeError {
        /// The position that was out of range
        pos: usize,
    },
    /// {0}
    Index(#[from] IndexError),
}

/// A node in the resolution path
#[derive(Clone, PartialEq, new)]
pub(crate) struct ResolvedNode<'a> {
    /// Reference to the node
    pub node: &'a Node,
    /// Index of the position within the node's fragment
    pub index: usize,
    /// Offset immediately before the node
    pub before: usize,
}

impl<'a> fmt::Debug for ResolvedNode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedNode")
            .field("node.type", self.node.r#type())
            .field("index", &self.index)
            .field("before", &self.before)
            .finish()
    }
}

/// You can resolve a position to get more information about it. Objects of
/// this class represent such a resolved position, providing various pieces of
/// context information, and some helper methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPos<'a> {
    pos: usize,
    path: Vec<ResolvedNode<'a>>,
    parent_offset: usize,
    depth: usize,
}

impl<'a> ResolvedPos<'a> {
    pub(crate) fn new(pos: usize, path: Vec<ResolvedNode<'a>>, parent_offset: usize) -> Self {
        Self {
            depth: path.len() - 1,
            pos,
            path,
            parent_offset,
        }
    }

    /// The position that was resolved.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The number of levels the parent node is from the root. If this
    /// position points directly into the root node, it is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The offset this position has into its parent node.
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// The parent node that the position points into. Note that even if a
    /// position points into a text node, that node is not considered the
    /// parent — text nodes are 'flat' in this model, and have no content.
    pub fn parent(&self) -> &'a Node {
        self.node(self.depth)
    }

    /// The root node in which the position was resolved.
    pub fn doc(&self) -> &'a Node {
        self.node(0)
    }

    /// The ancestor node at the given level. `p.node(p.depth())` is the same
    /// as `p.parent()`.
    pub fn node(&self, depth: usize) -> &'a Node {
        self.path[depth].node
    }

    /// The index into the ancestor at the given level. If this points at the
    /// 3rd node in the 2nd paragraph on the top level, for example,
    /// `p.index(0)` is 1 and `p.index(1)` is 2.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// The index pointing after this position into the ancestor at the given
    /// level.
    pub fn index_after(&self, depth: usize) -> usize {
        let index = self.index(depth);
        if depth == self.depth && self.text_offset() == 0 {
            index
        } else {
            index + 1
        }
    }

    /// The (absolute) position at the start of the node at the given level.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].before + 1
        }
    }

    /// The (absolute) position at the end of the node at the given level.
    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content_size()
    }

    /// The (absolute) position directly before the wrapping node at the given
    /// level, or, when depth is `self.depth() + 1`, the original position.
    pub fn before(&self, depth: usize) -> Option<usize> {
        if depth == 0 {
            None
        } else if depth == self.depth + 1 {
            Some(self.pos)
        } else {
            Some(self.path[depth - 1].before)
        }
    }

    /// The (absolute) position directly after the wrapping node at the given
    /// level, or the original position when depth is `self.depth() + 1`.
    pub fn after(&self, depth: usize) -> Option<usize> {
        if depth == 0 {
            None
        } else if depth == self.depth + 1 {
            Some(self.pos)
        } else {
            Some(self.path[depth - 1].before + self.path[depth].node.node_size())
        }
    }

    /// When this position points into a text node, this returns the distance
    /// between the position and the start of the text node. Will be zero for
    /// positions that point between nodes.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path.last().unwrap().before
    }

    /// Get the node directly before the position, if any. If the position
    /// points into a text node, only the part of that node before the
    /// position is returned.
    pub fn node_before(&self) -> Option<Cow<'a, Node>> {
        let index = self.index(self.depth);
        let d_off = self.pos - self.path.last().unwrap().before;
        if d_off > 0 {
            let parent = self.parent();
            let child = parent.child(index);
            Some(child.cut(0..d_off))
        } else if index == 0 {
            None
        } else {
            Some(Cow::Borrowed(self.parent().child(index - 1)))
        }
    }

    /// Get the node directly after the position, if any. If the position
    /// points into a text node, only the part of that node after the position
    /// is returned.
    pub fn node_after(&self) -> Option<Cow<'a, Node>> {
        let parent = self.parent();
        let index = self.index(self.depth);
        if index == parent.child_count() {
            return None;
        }
        let d_off = self.pos - self.path.last().unwrap().before;
        let child = parent.child(index);
        if d_off > 0 {
            Some(child.cut(d_off..))
        } else {
            Some(Cow::Borrowed(child))
        }
    }

    /// The (absolute) position of the child node with the given index into
    /// the ancestor at the given level.
    pub fn pos_at_index(&self, index: usize, depth: usize) -> usize {
        let node = self.node(depth);
        let mut pos = self.start(depth);
        for i in 0..index {
            pos += node.child(i).node_size();
        }
        pos
    }

    /// Get the marks at this position, factoring in the surrounding marks'
    /// inclusive property. If the position is at the start of a non-empty
    /// node, the marks of the node after it (if any) are returned.
    pub fn marks(&self) -> MarkSet {
        let parent = self.parent();
        let index = self.index(self.depth);

        if parent.content_size() == 0 {
            return MarkSet::default();
        }

        // In a text node, simply take the node's marks
        if self.text_offset() > 0 {
            return parent.child(index).marks().clone();
        }

        let before = if index > 0 {
            parent.maybe_child(index - 1)
        } else {
            None
        };
        let (main, other) = if before.is_some() {
            (before, parent.maybe_child(index))
        } else {
            (parent.maybe_child(index), before)
        };

        let main = match main {
            Some(main) => main,
            None => return MarkSet::default(),
        };
        let mut marks = main.marks().clone();
        for mark in main.marks() {
            if mark.r#type().inclusive() {
                continue;
            }
            if !matches!(other, Some(other) if mark.is_in_set(other.marks())) {
                marks.remove(mark);
            }
        }
        marks
    }

    /// The depth up to which this position and the given (non-resolved)
    /// position share the same parent nodes.
    pub fn shared_depth(&self, pos: usize) -> usize {
        for depth in (1..=self.depth).rev() {
            if self.start(depth) <= pos && self.end(depth) >= pos {
                return depth;
            }
        }
        0
    }

    /// Query whether the given position shares the same parent node.
    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.pos - self.parent_offset == other.pos - other.parent_offset
    }

    /// Return the greater of this and the given position.
    pub fn max<'b>(&'b self, other: &'b ResolvedPos<'a>) -> &'b ResolvedPos<'a> {
        if other.pos > self.pos {
            other
        } else {
            self
        }
    }

    /// Return the smaller of this and the given position.
    pub fn min<'b>(&'b self, other: &'b ResolvedPos<'a>) -> &'b ResolvedPos<'a> {
        if other.pos < self.pos {
            other
        } else {
            self
        }
    }

    /// Returns a range based on the place where this position and the given
    /// position diverge around block content. If both point into the same
    /// textblock, for example, a range around that textblock will be
    /// returned. If they point into different blocks, the range around those
    /// blocks in their shared ancestor is returned. You can pass in an
    /// optional predicate that will be called with a parent node to filter
    /// the found ranges.
    pub fn block_range(
        &self,
        other: &ResolvedPos<'a>,
        pred: Option<&dyn Fn(&Node) -> bool>,
    ) -> Option<NodeRange<'a>> {
        if other.pos < self.pos {
            return other.block_range(self, pred);
        }
        let adjust = if self.parent().is_inline() || self.pos == other.pos {
            1
        } else {
            0
        };
        if adjust > self.depth {
            return None;
        }
        for depth in (0..=self.depth - adjust).rev() {
            if other.pos <= self.end(depth) && pred.map_or(true, |pred| pred(self.node(depth))) {
                return Some(NodeRange {
                    rp_from: self.clone(),
                    rp_to: other.clone(),
                    depth,
                });
            }
        }
        None
    }

    pub(crate) fn resolve(doc: &'a Node, pos: usize) -> Result<Self, ResolveError> {
        if pos > doc.content_size() {
            return Err(ResolveError::RangeError { pos });
        }
        let mut path = vec![];
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc;

        loop {
            let index = node.content().find_index(parent_offset, false)?;
            let rem = parent_offset - index.offset;
            path.push(ResolvedNode::new(node, index.index, start + index.offset));
            if rem == 0 {
                break;
            }
            node = node.child(index.index);
            if node.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += index.offset + 1;
        }
        Ok(ResolvedPos::new(pos, path, parent_offset))
    }
}

impl<'a> fmt::Display for ResolvedPos<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, step) in self.path.iter().enumerate().skip(1) {
            write!(
                f,
                "{}{}_{}",
                if depth > 1 { "/" } else { "" },
                step.node.r#type().name(),
                self.index(depth - 1)
            )?;
        }
        write!(f, ":{}", self.parent_offset)
    }
}

/// Represents a flat range of content, i.e. one that starts and ends in the
/// same node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRange<'a> {
    rp_from: ResolvedPos<'a>,
    rp_to: ResolvedPos<'a>,
    depth: usize,
}

impl<'a> NodeRange<'a> {
    /// Construct a node range. `from` and `to` should point into the same
    /// node until at least the given `depth`, since a node range denotes an
    /// adjacent set of nodes in a single parent node.
    pub fn new(rp_from: ResolvedPos<'a>, rp_to: ResolvedPos<'a>, depth: usize) -> Self {
        NodeRange {
            rp_from,
            rp_to,
            depth,
        }
    }

    /// A resolved position along the start of the content. May have a depth
    /// greater than this object's depth property, since these are the
    /// positions that were used to compute the range, not re-resolved
    /// positions directly at its boundaries.
    pub fn rp_from(&self) -> &ResolvedPos<'a> {
        &self.rp_from
    }

    /// A position along the end of the content.
    pub fn rp_to(&self) -> &ResolvedPos<'a> {
        &self.rp_to
    }

    /// The depth of the node that this range points into.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The position at the start of the range.
    pub fn start(&self) -> usize {
        self.rp_from.before(self.depth + 1).unwrap()
    }

    /// The position at the end of the range.
    pub fn end(&self) -> usize {
        self.rp_to.after(self.depth + 1).unwrap()
    }

    /// The parent node that the range points into.
    pub fn parent(&self) -> &'a Node {
        self.rp_from.node(self.depth)
    }

    /// The start index of the range in the parent node.
    pub fn start_index(&self) -> usize {
        self.rp_from.index(self.depth)
    }

    /// The end index of the range in the parent node.
    pub fn end_index(&self) -> usize {
        self.rp_to.index_after(self.depth)
    }
}
