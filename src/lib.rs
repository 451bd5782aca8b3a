#![warn(missing_docs)]
//! # A schema-based rich-text document model
//!
//! This crate implements the document model of a rich-text editor: a
//! persistent tree of typed nodes carrying typed marks, validated by a
//! schema that is compiled at runtime from node and mark specs.
//!
//! The pieces fit together as follows:
//!
//! - [`Schema`] compiles [`SchemaSpec`]s into [`NodeType`]s (each with a
//!   [`ContentMatch`] automaton over its child sequence) and [`MarkType`]s
//!   with an exclusion table.
//! - [`Node`]s are immutable values built through the schema's factories;
//!   [`Fragment`]s hold their children, [`Mark`]s annotate inline content.
//! - Integer positions index the tree; [`ResolvedPos`] decodes them and
//!   [`Node::replace`] splices a [`Slice`] between two of them.
//! - [`DomParser`] reads a DOM-shaped source tree (abstracted by the
//!   [`Dom`] trait) into a schema-conforming document; [`DomSerializer`]
//!   renders documents back out through per-type output templates.

mod attrs;
mod content;
mod dom;
mod fragment;
mod from_dom;
mod mark;
mod node;
mod replace;
mod resolved_pos;
mod schema;
mod slice;
mod text;
mod to_dom;
pub(crate) mod util;

pub use attrs::{AttrError, AttributeSpec, Attrs};
pub use content::{ContentError, ContentMatch, ContentMatchError};
pub use dom::{Dom, DomKind, DomNode, Element};
pub use fragment::{Fragment, IndexError};
pub use from_dom::{
    ContentElement, ContentElementFn, DomParser, FindPosition, GetContent, ParseAction,
    ParseOptions, ParseRule, PreserveWhitespace, RuleSelector, StyleGetAttrs, TagGetAttrs,
};
pub use mark::{Mark, MarkSet};
pub use node::{CheckError, FromJsonError, Node};
pub use replace::ReplaceError;
pub use resolved_pos::{NodeRange, ResolveError, ResolvedPos};
pub use schema::{
    CreateError, LeafText, MarkSpec, MarkToDom, MarkType, NodeSpec, NodeToDom, NodeType, Schema,
    SchemaError, SchemaSpec, Whitespace,
};
pub use slice::{Slice, SpliceError};
pub use text::Text;
pub use to_dom::{DomSerializer, OutputSpec, SerializeError, SerializeOptions};

#[cfg(test)]
mod tests;
