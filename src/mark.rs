//! # Marks
//!
//! A mark is a piece of information that can be attached to a node, such as
//! it being emphasized, in code font, or a link. It has a type and optionally
//! a set of attributes that provide further information (such as the target
//! of the link).

use crate::attrs::Attrs;
use crate::node::FromJsonError;
use crate::schema::{MarkType, Schema};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

struct MarkData {
    r#type: MarkType,
    attrs: Attrs,
}

/// A mark value: a type paired with concrete attributes. Cheap to clone,
/// compared structurally.
#[derive(Clone)]
pub struct Mark {
    data: Arc<MarkData>,
}

impl PartialEq for Mark {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
            || (self.data.r#type == other.data.r#type && self.data.attrs == other.data.attrs)
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.attrs.is_empty() {
            write!(f, "{}", self.data.r#type.name())
        } else {
            write!(
                f,
                "{}({})",
                self.data.r#type.name(),
                Value::Object(self.data.attrs.clone())
            )
        }
    }
}

impl Mark {
    pub(crate) fn new(r#type: MarkType, attrs: Attrs) -> Mark {
        Mark {
            data: Arc::new(MarkData { r#type, attrs }),
        }
    }

    /// The type of this mark.
    pub fn r#type(&self) -> MarkType {
        self.data.r#type.clone()
    }

    /// The attributes associated with this mark.
    pub fn attrs(&self) -> &Attrs {
        &self.data.attrs
    }

    /// Given a set of marks, create a new set which contains this one as
    /// well, in the right position. If this mark is already in the set, the
    /// set itself is returned. If any marks that are set to be exclusive with
    /// this mark are present, those are replaced by this one.
    pub fn add_to_set<'a>(&self, set: Cow<'a, MarkSet>) -> Cow<'a, MarkSet> {
        let r#type = &self.data.r#type;
        let mut copy: Option<Vec<Mark>> = None;
        let mut placed = false;
        for (i, other) in set.content.iter().enumerate() {
            if self == other {
                return set;
            }
            let other_type = other.r#type();
            if r#type.excludes(&other_type) {
                if copy.is_none() {
                    copy = Some(set.content[..i].to_vec());
                }
            } else if other_type.excludes(r#type) {
                return set;
            } else {
                if !placed && other_type.rank() > r#type.rank() {
                    let target = copy.get_or_insert_with(|| set.content[..i].to_vec());
                    target.push(self.clone());
                    placed = true;
                }
                if let Some(target) = &mut copy {
                    target.push(other.clone());
                }
            }
        }
        let mut copy = copy.unwrap_or_else(|| set.content.clone());
        if !placed {
            copy.push(self.clone());
        }
        Cow::Owned(MarkSet { content: copy })
    }

    /// Remove this mark from the given set, returning a new set. If this mark
    /// is not in the set, the set itself is returned.
    pub fn remove_from_set<'a>(&self, set: Cow<'a, MarkSet>) -> Cow<'a, MarkSet> {
        match set.content.iter().position(|other| self == other) {
            Some(index) => {
                let mut owned = set.into_owned();
                owned.content.remove(index);
                Cow::Owned(owned)
            }
            None => set,
        }
    }

    /// Test whether this mark (type and attributes) is in the given set.
    pub fn is_in_set(&self, set: &MarkSet) -> bool {
        set.content.iter().any(|other| self == other)
    }

    /// Create a set with just this mark.
    pub fn into_set(self) -> MarkSet {
        MarkSet {
            content: vec![self],
        }
    }

    /// Deserialize a mark from its JSON representation.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<Mark, FromJsonError> {
        let obj = json.as_object().ok_or(FromJsonError::InvalidMark)?;
        let name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FromJsonError::InvalidMark)?;
        let attrs = match obj.get("attrs") {
            Some(Value::Object(attrs)) => Some(attrs),
            Some(Value::Null) | None => None,
            Some(_) => return Err(FromJsonError::InvalidMark),
        };
        let mark = schema.mark(name, attrs)?;
        Ok(mark)
    }

    /// The JSON representation of this mark.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("mark serialization is infallible")
    }
}

impl Serialize for Mark {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.data.attrs.is_empty() { 1 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("type", self.data.r#type.name())?;
        if !self.data.attrs.is_empty() {
            map.serialize_entry("attrs", &self.data.attrs)?;
        }
        map.end()
    }
}

/// A set of marks, ordered by ascending mark type rank and containing at most
/// one mark per single-instance type.
#[derive(Clone, Default, PartialEq)]
pub struct MarkSet {
    content: Vec<Mark>,
}

impl MarkSet {
    /// Create a properly sorted mark set from an arbitrary list of marks.
    pub fn set_from(mut marks: Vec<Mark>) -> MarkSet {
        marks.sort_by_key(|mark| mark.r#type().rank());
        MarkSet { content: marks }
    }

    /// The number of marks in the set.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// True when the set holds no marks.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Iterate over the marks, in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, Mark> {
        self.content.iter()
    }

    /// Check whether the set contains this exact mark.
    pub fn contains(&self, mark: &Mark) -> bool {
        self.content.iter().any(|other| other == mark)
    }

    /// Check whether the set contains a mark of the given type, regardless of
    /// its attributes.
    pub fn contains_type(&self, r#type: &MarkType) -> bool {
        self.content.iter().any(|mark| &mark.r#type() == r#type)
    }

    /// Add a mark to this set, honoring exclusion and rank order.
    pub fn add(&mut self, mark: &Mark) {
        *self = mark.add_to_set(Cow::Borrowed(self)).into_owned();
    }

    /// Remove a mark (matched by type and attributes) from this set.
    pub fn remove(&mut self, mark: &Mark) {
        *self = mark.remove_from_set(Cow::Borrowed(self)).into_owned();
    }

    /// Deserialize a list of marks from JSON.
    pub fn from_json(schema: &Schema, json: &Value) -> Result<MarkSet, FromJsonError> {
        let list = json.as_array().ok_or(FromJsonError::InvalidMark)?;
        let mut marks = Vec::with_capacity(list.len());
        for item in list {
            marks.push(Mark::from_json(schema, item)?);
        }
        Ok(MarkSet::set_from(marks))
    }
}

impl<'a> IntoIterator for &'a MarkSet {
    type Item = &'a Mark;
    type IntoIter = std::slice::Iter<'a, Mark>;
    fn into_iter(self) -> Self::IntoIter {
        self.content.iter()
    }
}

impl std::iter::FromIterator<Mark> for MarkSet {
    fn from_iter<I: IntoIterator<Item = Mark>>(iter: I) -> Self {
        MarkSet::set_from(iter.into_iter().collect())
    }
}

impl From<Mark> for MarkSet {
    fn from(mark: Mark) -> MarkSet {
        mark.into_set()
    }
}

impl fmt::Debug for MarkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.content.fmt(f)
    }
}

impl Serialize for MarkSet {
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.content.serialize(serializer)
    }
}
