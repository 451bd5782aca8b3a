//! # Slices

use crate::fragment::{Fragment, IndexError};
use crate::node::{FromJsonError, Node};
use crate::schema::Schema;
use displaydoc::Display;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error when splicing content into or out of a slice
#[derive(Debug, Display, Error)]
pub enum SpliceError {
    /// {0}
    Index(#[from] IndexError),
    /// Removing non-flat range
    NonFlat,
}

/// A slice represents a piece cut out of a larger document. It stores not
/// only a fragment, but also the depth up to which nodes on both sides are
/// 'open' (cut through).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    /// The slice's content.
    content: Fragment,
    /// The open depth at the start.
    open_start: usize,
    /// The open depth at the end.
    open_end: usize,
}

impl Slice {
    /// Create a slice. When specifying a non-zero open depth, you must make
    /// sure that there are nodes of at least that depth at the appropriate
    /// side of the fragment — i.e. if the fragment is an empty paragraph
    /// node, `open_start` and `open_end` can't be greater than 1.
    ///
    /// It is not necessary for the content of open nodes to conform to the
    /// schema's content constraints, though it should be a valid
    /// start/end/middle for such a node, depending on which sides are open.
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Slice {
        Slice {
            content,
            open_start,
            open_end,
        }
    }

    /// Create a slice where both sides are open as far as the fragment's
    /// first and last single-child chains allow. When `open_isolating` is
    /// false, isolating node boundaries are not opened.
    pub fn max_open(fragment: Fragment, open_isolating: bool) -> Slice {
        let mut open_start = 0;
        let mut node = fragment.first_child();
        while let Some(child) = node {
            if child.is_leaf() || (!open_isolating && child.r#type().spec().isolating) {
                break;
            }
            open_start += 1;
            node = child.first_child();
        }
        let mut open_end = 0;
        let mut node = fragment.last_child();
        while let Some(child) = node {
            if child.is_leaf() || (!open_isolating && child.r#type().spec().isolating) {
                break;
            }
            open_end += 1;
            node = child.last_child();
        }
        Slice::new(fragment, open_start, open_end)
    }

    /// The slice's content.
    pub fn content(&self) -> &Fragment {
        &self.content
    }

    /// The open depth at the start of the fragment.
    pub fn open_start(&self) -> usize {
        self.open_start
    }

    /// The open depth at the end.
    pub fn open_end(&self) -> usize {
        self.open_end
    }

    /// The size this slice would add when inserted into a document.
    pub fn size(&self) -> usize {
        self.content.size() - self.open_start - self.open_end
    }

    /// Insert the given fragment at `pos`, descending into open nodes where
    /// needed. Returns `None` when the content does not fit at that point.
    pub fn insert_at(&self, pos: usize, fragment: Fragment) -> Result<Option<Slice>, SpliceError> {
        let content = insert_into(&self.content, pos + self.open_start, fragment, None)?;
        Ok(content.map(|c| Slice::new(c, self.open_start, self.open_end)))
    }

    /// Remove the content between the two positions, which must both sit
    /// between (not inside) leaf-level nodes at the same depth.
    pub fn remove_between(&self, from: usize, to: usize) -> Result<Slice, SpliceError> {
        let content = remove_range(
            &self.content,
            from + self.open_start,
            to + self.open_start,
        )?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    /// Deserialize a slice from its JSON representation.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Slice, FromJsonError> {
        let obj = json.as_object().ok_or(FromJsonError::InvalidNode)?;
        let content = Fragment::from_json(schema, obj.get("content").unwrap_or(&Value::Null))?;
        let open_start = obj
            .get("openStart")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let open_end = obj.get("openEnd").and_then(Value::as_u64).unwrap_or(0) as usize;
        Ok(Slice::new(content, open_start, open_end))
    }

    /// The JSON representation of this slice.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("slice serialization is infallible")
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.content, self.open_start, self.open_end)
    }
}

impl Serialize for Slice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("content", &self.content)?;
        if self.open_start > 0 {
            map.serialize_entry("openStart", &self.open_start)?;
        }
        if self.open_end > 0 {
            map.serialize_entry("openEnd", &self.open_end)?;
        }
        map.end()
    }
}

fn insert_into(
    content: &Fragment,
    dist: usize,
    insert: Fragment,
    parent: Option<&Node>,
) -> Result<Option<Fragment>, SpliceError> {
    let index = content.find_index(dist, false)?;
    let child = content.maybe_child(index.index);
    if index.offset == dist || matches!(child, Some(c) if c.is_text()) {
        if let Some(parent) = parent {
            if !parent.can_replace(index.index, index.index, Some(&insert), ..) {
                return Ok(None);
            }
        }

        Ok(Some(
            content
                .cut(..dist)
                .append(insert)
                .append(content.cut(dist..)),
        ))
    } else {
        let child = child.expect("offset != dist implies a child under the position");
        let inner = insert_into(child.content(), dist - index.offset - 1, insert, None)?;
        if let Some(inner) = inner {
            Ok(Some(
                content
                    .replace_child(index.index, child.copy(move |_| inner))
                    .into_owned(),
            ))
        } else {
            Ok(None)
        }
    }
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> Result<Fragment, SpliceError> {
    let index = content.find_index(from, false)?;
    let child = content.maybe_child(index.index);
    let index_to = content.find_index(to, false)?;
    if index.offset == from || matches!(child, Some(c) if c.is_text()) {
        if index_to.offset != to && !content.child(index_to.index).is_text() {
            return Err(SpliceError::NonFlat);
        }
        return Ok(content.cut(0..from).append(content.cut(to..)));
    }
    if index.index != index_to.index {
        return Err(SpliceError::NonFlat);
    }
    let child = child.expect("offset != from implies a child under the position");
    let inner = remove_range(child.content(), from - index.offset - 1, to - index.offset - 1)?;
    Ok(content
        .replace_child(index.index, child.copy(move |_| inner))
        .into_owned())
}
