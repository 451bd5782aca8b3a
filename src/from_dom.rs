//! # Parsing from a tree
//!
//! A [`DomParser`] turns a DOM-shaped source tree into a schema-conforming
//! document. It is driven by [`ParseRule`]s, and recovers from content that
//! does not fit by wrapping it, synthesizing required nodes, or dropping it.

use crate::attrs::Attrs;
use crate::content::ContentMatch;
use crate::dom::{query_selector, Dom, DomKind};
use crate::fragment::Fragment;
use crate::mark::{Mark, MarkSet};
use crate::node::Node;
use crate::schema::{NodeType, Schema, Whitespace};
use crate::slice::Slice;
use crate::text::Text;
use derivative::Derivative;
use std::borrow::Cow;
use std::sync::Arc;

/// Computes rule attributes from a matched element; `None` means the rule
/// does not apply after all.
pub type TagGetAttrs = Arc<dyn Fn(&dyn Dom) -> Option<Attrs> + Send + Sync>;
/// Computes rule attributes from a matched style value.
pub type StyleGetAttrs = Arc<dyn Fn(&str) -> Option<Attrs> + Send + Sync>;
/// Produces a node's content directly, replacing the recursive content parse.
pub type GetContent = Arc<dyn Fn(&dyn Dom, &Schema) -> Fragment + Send + Sync>;
/// Locates the element whose children make up the matched element's content.
pub type ContentElementFn =
    Arc<dyn for<'a> Fn(&'a dyn Dom) -> &'a (dyn Dom) + Send + Sync>;

/// The selector half of a parse rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSelector {
    /// A CSS selector to match elements against
    Tag(String),
    /// A CSS property name, optionally followed by `=value`, matched against
    /// inline styles
    Style(String),
}

/// What a matched rule turns its element into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAction {
    /// Create a node of the named type
    Node(String),
    /// Apply a mark of the named type to the element's content
    Mark(String),
    /// Drop the element and everything in it
    Ignore,
    /// Parse the element's content as if the element were not there
    Skip,
    /// Close the current node context before continuing
    CloseParent,
}

/// Where to find a matched element's content.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub enum ContentElement {
    /// The first descendant matching this selector
    Selector(String),
    /// Computed from the matched element
    Fn(#[derivative(Debug = "ignore")] ContentElementFn),
}

/// How whitespace in parsed content is treated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreserveWhitespace {
    /// Collapse whitespace runs to single spaces, drop leading/trailing space
    Collapse,
    /// Preserve whitespace, but normalize newlines to spaces
    Preserve,
    /// Preserve whitespace verbatim
    Full,
}

/// A value that describes how to parse a given element or style.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ParseRule {
    /// The tag or style this rule matches on
    pub selector: RuleSelector,
    /// Only match elements in this namespace
    pub namespace: Option<String>,
    /// A context path expression (`"blockquote/"`,
    /// `"doc//list_item/"`, alternatives separated by `|`) that the parse
    /// stack must match for this rule to apply
    pub context: Option<String>,
    /// The effect of the rule. `None` on a schema spec rule means "the owning
    /// type"; on a free-standing rule it acts like [`ParseAction::Skip`]
    pub action: Option<ParseAction>,
    /// The order in which rules are tried; higher comes first (default 50)
    pub priority: Option<i32>,
    /// When false, later rules may also match an element this rule matched
    pub consuming: Option<bool>,
    /// Attributes for the created node or mark
    pub attrs: Option<Attrs>,
    /// Computes attributes from the matched element
    #[derivative(Debug = "ignore")]
    pub get_attrs: Option<TagGetAttrs>,
    /// Computes attributes from the matched style value
    #[derivative(Debug = "ignore")]
    pub get_style_attrs: Option<StyleGetAttrs>,
    /// Locates the child content of the matched element
    pub content_element: Option<ContentElement>,
    /// Produces the content directly instead of parsing the element's
    /// children
    #[derivative(Debug = "ignore")]
    pub get_content: Option<GetContent>,
    /// Overrides the whitespace policy for the element's content
    pub preserve_whitespace: Option<PreserveWhitespace>,
}

impl ParseRule {
    fn with_selector(selector: RuleSelector) -> ParseRule {
        ParseRule {
            selector,
            namespace: None,
            context: None,
            action: None,
            priority: None,
            consuming: None,
            attrs: None,
            get_attrs: None,
            get_style_attrs: None,
            content_element: None,
            get_content: None,
            preserve_whitespace: None,
        }
    }

    /// A rule matching elements against a CSS selector.
    pub fn tag<S: Into<String>>(selector: S) -> ParseRule {
        ParseRule::with_selector(RuleSelector::Tag(selector.into()))
    }

    /// A rule matching an inline style property, either by name or as
    /// `"property=value"`.
    pub fn style<S: Into<String>>(property: S) -> ParseRule {
        ParseRule::with_selector(RuleSelector::Style(property.into()))
    }

    /// Make this rule produce a node of the given type.
    pub fn node<S: Into<String>>(mut self, name: S) -> ParseRule {
        self.action = Some(ParseAction::Node(name.into()));
        self
    }

    /// Make this rule wrap its content in a mark of the given type.
    pub fn mark<S: Into<String>>(mut self, name: S) -> ParseRule {
        self.action = Some(ParseAction::Mark(name.into()));
        self
    }

    /// Make this rule drop the matched element entirely.
    pub fn ignore(mut self) -> ParseRule {
        self.action = Some(ParseAction::Ignore);
        self
    }

    /// Make this rule skip the element but parse its children.
    pub fn skip(mut self) -> ParseRule {
        self.action = Some(ParseAction::Skip);
        self
    }

    /// Make this rule close the current node context.
    pub fn close_parent(mut self) -> ParseRule {
        self.action = Some(ParseAction::CloseParent);
        self
    }

    /// Restrict the rule to elements in the given namespace.
    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> ParseRule {
        self.namespace = Some(namespace.into());
        self
    }

    /// Restrict the rule to a parse context.
    pub fn context<S: Into<String>>(mut self, context: S) -> ParseRule {
        self.context = Some(context.into());
        self
    }

    /// Set the rule's priority (default 50, higher runs first).
    pub fn priority(mut self, priority: i32) -> ParseRule {
        self.priority = Some(priority);
        self
    }

    /// Allow later rules to also match elements this rule matched.
    pub fn non_consuming(mut self) -> ParseRule {
        self.consuming = Some(false);
        self
    }

    /// Use fixed attributes for the created node or mark.
    pub fn attrs(mut self, attrs: Attrs) -> ParseRule {
        self.attrs = Some(attrs);
        self
    }

    /// Compute attributes from the matched element. Returning `None` makes
    /// the rule not match after all.
    pub fn get_attrs<F>(mut self, f: F) -> ParseRule
    where
        F: Fn(&dyn Dom) -> Option<Attrs> + Send + Sync + 'static,
    {
        self.get_attrs = Some(Arc::new(f));
        self
    }

    /// Compute attributes from the matched style's value.
    pub fn get_style_attrs<F>(mut self, f: F) -> ParseRule
    where
        F: Fn(&str) -> Option<Attrs> + Send + Sync + 'static,
    {
        self.get_style_attrs = Some(Arc::new(f));
        self
    }

    /// Find the content of matched elements under the first descendant
    /// matching a selector.
    pub fn content_element<S: Into<String>>(mut self, selector: S) -> ParseRule {
        self.content_element = Some(ContentElement::Selector(selector.into()));
        self
    }

    /// Locate the content element with a function.
    pub fn content_element_fn<F>(mut self, f: F) -> ParseRule
    where
        F: for<'a> Fn(&'a dyn Dom) -> &'a (dyn Dom) + Send + Sync + 'static,
    {
        self.content_element = Some(ContentElement::Fn(Arc::new(f)));
        self
    }

    /// Produce the node's content directly instead of parsing children.
    pub fn get_content<F>(mut self, f: F) -> ParseRule
    where
        F: Fn(&dyn Dom, &Schema) -> Fragment + Send + Sync + 'static,
    {
        self.get_content = Some(Arc::new(f));
        self
    }

    /// Override the whitespace policy inside the matched element.
    pub fn preserve_whitespace(mut self, ws: PreserveWhitespace) -> ParseRule {
        self.preserve_whitespace = Some(ws);
        self
    }
}

/// A source position to be mapped to a document position during a parse.
pub struct FindPosition<'a> {
    /// The source node to locate
    pub node: &'a dyn Dom,
    /// The offset into that node
    pub offset: usize,
}

/// Options recognized by the parse methods.
#[derive(Derivative)]
#[derivative(Debug, Default)]
pub struct ParseOptions<'a> {
    /// Override the default whitespace policy at the top of the parse
    pub preserve_whitespace: Option<PreserveWhitespace>,
    /// Source positions to resolve to document positions
    #[derivative(Debug = "ignore")]
    pub find_positions: Vec<FindPosition<'a>>,
    /// The child index of the top element to start at
    pub from: Option<usize>,
    /// The child index of the top element to stop before
    pub to: Option<usize>,
    /// The node to parse the content into
    pub top_node: Option<Node>,
    /// Starting content match for the top node
    #[derivative(Debug = "ignore")]
    pub top_match: Option<ContentMatch>,
    /// Ancestor node names above the parse top (outermost first), used by
    /// rule `context` expressions
    pub context: Vec<String>,
    /// Overrides rule lookup per element
    #[derivative(Debug = "ignore")]
    pub rule_from_node: Option<Box<dyn Fn(&dyn Dom) -> Option<ParseRule> + 'a>>,
}

const OPT_PRESERVE_WS: u8 = 1;
const OPT_PRESERVE_WS_FULL: u8 = 2;
const OPT_OPEN_LEFT: u8 = 4;

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\u{c}')
}

fn collapse_ws(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_ws = false;
    for c in value.chars() {
        if is_ws(c) {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

fn newlines_to_spaces(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn normalize_crlf(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

fn ws_options_for(
    r#type: Option<&NodeType>,
    preserve: Option<PreserveWhitespace>,
    base: u8,
) -> u8 {
    if let Some(preserve) = preserve {
        return match preserve {
            PreserveWhitespace::Collapse => 0,
            PreserveWhitespace::Preserve => OPT_PRESERVE_WS,
            PreserveWhitespace::Full => OPT_PRESERVE_WS | OPT_PRESERVE_WS_FULL,
        };
    }
    match r#type {
        Some(t) if t.whitespace() == Whitespace::Pre => OPT_PRESERVE_WS | OPT_PRESERVE_WS_FULL,
        _ => base & !OPT_OPEN_LEFT,
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "canvas",
    "dd",
    "div",
    "dl",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hgroup",
    "hr",
    "li",
    "noscript",
    "ol",
    "output",
    "p",
    "pre",
    "section",
    "table",
    "tfoot",
    "ul",
];

const IGNORE_TAGS: &[&str] = &["head", "noscript", "object", "script", "style", "title"];

const LIST_TAGS: &[&str] = &["ol", "ul"];

/// A DOM parser represents a strategy for parsing source content into a
/// document conforming to a given schema. Its behavior is defined by an
/// ordered array of rules.
pub struct DomParser {
    schema: Schema,
    tags: Vec<ParseRule>,
    styles: Vec<ParseRule>,
    normalize_lists: bool,
}

impl DomParser {
    /// Create a parser that targets the given schema, with the given set of
    /// parsing rules, which are expected to be pre-sorted by priority.
    pub fn new(schema: &Schema, rules: Vec<ParseRule>) -> DomParser {
        let mut tags = Vec::new();
        let mut styles = Vec::new();
        for rule in rules {
            match rule.selector {
                RuleSelector::Tag(_) => tags.push(rule),
                RuleSelector::Style(_) => styles.push(rule),
            }
        }
        // Leave lists alone when a list node type may contain itself
        let normalize_lists = !tags.iter().any(|rule| {
            let tag = match &rule.selector {
                RuleSelector::Tag(tag) => tag,
                RuleSelector::Style(_) => return false,
            };
            let is_list_tag = tag
                .split(|c: char| !c.is_ascii_alphanumeric())
                .next()
                .map_or(false, |word| word == "ul" || word == "ol");
            if !is_list_tag {
                return false;
            }
            match &rule.action {
                Some(ParseAction::Node(name)) => match schema.node_type(name) {
                    Some(r#type) => r#type.content_match().match_type(&r#type).is_some(),
                    None => false,
                },
                _ => false,
            }
        });
        DomParser {
            schema: schema.clone(),
            tags,
            styles,
            normalize_lists,
        }
    }

    /// Build (and cache on the schema) a parser using the `parse_dom` rules
    /// listed in the schema's mark and node specs, sorted by priority.
    pub fn from_schema(schema: &Schema) -> Arc<DomParser> {
        if let Some(cached) = schema.cached("dom_parser") {
            if let Ok(parser) = cached.downcast::<DomParser>() {
                return parser;
            }
        }
        let parser = Arc::new(DomParser::new(schema, DomParser::schema_rules(schema)));
        schema.set_cached("dom_parser", parser.clone());
        parser
    }

    /// Extract the parse rules from a schema's node and mark specs, sorted by
    /// descending priority with ties kept in schema order (marks first).
    pub fn schema_rules(schema: &Schema) -> Vec<ParseRule> {
        let mut result: Vec<ParseRule> = Vec::new();
        let mut insert = |rule: ParseRule| {
            let priority = rule.priority.unwrap_or(50);
            let position = result
                .iter()
                .position(|other| other.priority.unwrap_or(50) < priority)
                .unwrap_or(result.len());
            result.insert(position, rule);
        };
        for r#type in schema.mark_types() {
            for rule in &r#type.spec().parse_dom {
                let mut rule = rule.clone();
                if rule.action.is_none() {
                    rule.action = Some(ParseAction::Mark(r#type.name().to_owned()));
                }
                insert(rule);
            }
        }
        for r#type in schema.node_types() {
            for rule in &r#type.spec().parse_dom {
                let mut rule = rule.clone();
                if rule.action.is_none() {
                    rule.action = Some(ParseAction::Node(r#type.name().to_owned()));
                }
                insert(rule);
            }
        }
        result
    }

    /// The schema this parser targets.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse a document from the content of a source element.
    pub fn parse(&self, dom: &dyn Dom, options: ParseOptions) -> Node {
        self.parse_positions(dom, options).0
    }

    /// Like [`DomParser::parse`], but also returns the document positions of
    /// the options' `find_positions`, in order.
    pub fn parse_positions(
        &self,
        dom: &dyn Dom,
        options: ParseOptions,
    ) -> (Node, Vec<Option<usize>>) {
        let mut context = ParseContext::new(self, options, false);
        let (from, to) = (context.options.from, context.options.to);
        context.add_all(dom, from, to);
        let positions = context.finds.iter().map(|find| find.pos).collect();
        match context.finish() {
            NodeOrFragment::Node(node) => (node, positions),
            NodeOrFragment::Fragment(content) => {
                // The top context always has a type in a closed parse
                let node = self
                    .schema
                    .top_node_type()
                    .create_and_fill(None, content, None)
                    .unwrap_or_else(|| {
                        self.schema
                            .top_node_type()
                            .create_and_fill(None, Fragment::default(), None)
                            .expect("the top node type must be self-constructible")
                    });
                (node, positions)
            }
        }
    }

    /// Parses the content of the given element into a slice, open at both
    /// sides.
    pub fn parse_slice(&self, dom: &dyn Dom, options: ParseOptions) -> Slice {
        let mut context = ParseContext::new(self, options, true);
        let (from, to) = (context.options.from, context.options.to);
        context.add_all(dom, from, to);
        let content = match context.finish() {
            NodeOrFragment::Fragment(content) => content,
            NodeOrFragment::Node(node) => node.content().clone(),
        };
        Slice::max_open(content, true)
    }

    fn match_tag(
        &self,
        dom: &dyn Dom,
        context: &ParseContext,
        after: Option<usize>,
    ) -> Option<(ParseRule, usize)> {
        let start = after.map(|i| i + 1).unwrap_or(0);
        for (i, rule) in self.tags.iter().enumerate().skip(start) {
            let selector = match &rule.selector {
                RuleSelector::Tag(selector) => selector,
                RuleSelector::Style(_) => continue,
            };
            if !dom.matches(selector) {
                continue;
            }
            if let Some(namespace) = &rule.namespace {
                if dom.namespace() != Some(namespace.as_str()) {
                    continue;
                }
            }
            if let Some(expr) = &rule.context {
                if !context.matches_context(expr) {
                    continue;
                }
            }
            let mut rule = rule.clone();
            if let Some(get_attrs) = &rule.get_attrs {
                match get_attrs(dom) {
                    Some(attrs) => rule.attrs = Some(attrs),
                    None => continue,
                }
            }
            return Some((rule, i));
        }
        None
    }

    fn match_style(
        &self,
        prop: &str,
        value: &str,
        context: &ParseContext,
        after: Option<usize>,
    ) -> Option<(ParseRule, usize)> {
        let start = after.map(|i| i + 1).unwrap_or(0);
        for (i, rule) in self.styles.iter().enumerate().skip(start) {
            let style = match &rule.selector {
                RuleSelector::Style(style) => style,
                RuleSelector::Tag(_) => continue,
            };
            // A style selector is a property name, optionally followed by
            // `=value` which must then match exactly.
            if !style.starts_with(prop) {
                continue;
            }
            if style.len() > prop.len()
                && (style.as_bytes()[prop.len()] != b'=' || &style[prop.len() + 1..] != value)
            {
                continue;
            }
            if let Some(expr) = &rule.context {
                if !context.matches_context(expr) {
                    continue;
                }
            }
            let mut rule = rule.clone();
            if let Some(get_attrs) = &rule.get_style_attrs {
                match get_attrs(value) {
                    Some(attrs) => rule.attrs = Some(attrs),
                    None => continue,
                }
            }
            return Some((rule, i));
        }
        None
    }
}

enum NodeOrFragment {
    Node(Node),
    Fragment(Fragment),
}

struct NodeContext {
    id: usize,
    r#type: Option<NodeType>,
    attrs: Option<Attrs>,
    /// Marks applied to the node itself when it is closed
    marks: MarkSet,
    /// Marks applying to the content currently being added
    active_marks: MarkSet,
    /// Marks seen on enclosing elements, not yet attached to content
    pending_marks: Vec<Mark>,
    solid: bool,
    r#match: Option<ContentMatch>,
    options: u8,
    content: Vec<Node>,
}

impl NodeContext {
    fn new(
        id: usize,
        r#type: Option<NodeType>,
        attrs: Option<Attrs>,
        marks: MarkSet,
        pending_marks: Vec<Mark>,
        solid: bool,
        r#match: Option<ContentMatch>,
        options: u8,
    ) -> NodeContext {
        let r#match = r#match.or_else(|| {
            if options & OPT_OPEN_LEFT != 0 {
                None
            } else {
                r#type.as_ref().map(NodeType::content_match)
            }
        });
        NodeContext {
            id,
            r#type,
            attrs,
            marks,
            active_marks: MarkSet::default(),
            pending_marks,
            solid,
            r#match,
            options,
            content: Vec::new(),
        }
    }

    /// Find the route of wrapper types that lets `node` appear here, laying
    /// in a content match for open-left contexts on the way.
    fn find_wrapping(&mut self, node: &Node) -> Option<Vec<NodeType>> {
        if self.r#match.is_none() {
            let r#type = match &self.r#type {
                Some(r#type) => r#type.clone(),
                None => return Some(Vec::new()),
            };
            let fill = r#type
                .content_match()
                .fill_before(&Fragment::from(node.clone()), false, 0);
            match fill {
                Some(fill) => {
                    self.r#match = r#type.content_match().match_fragment(&fill);
                }
                None => {
                    let start = r#type.content_match();
                    return match start.find_wrapping(node.r#type()) {
                        Some(wrap) => {
                            self.r#match = Some(start);
                            Some(wrap)
                        }
                        None => None,
                    };
                }
            }
        }
        self.r#match.as_ref().unwrap().find_wrapping(node.r#type())
    }

    /// Move the pending marks that may apply inside this context into the
    /// active set.
    fn apply_pending(&mut self, next_type: &NodeType) {
        let pending = self.pending_marks.clone();
        for mark in pending {
            let applies = match &self.r#type {
                Some(r#type) => r#type.allows_mark_type(&mark.r#type()),
                None => mark_may_apply(&mark.r#type(), next_type),
            };
            if applies && !mark.is_in_set(&self.active_marks) {
                self.active_marks.add(&mark);
                if let Some(found) = self.pending_marks.iter().position(|m| m == &mark) {
                    self.pending_marks.remove(found);
                }
            }
        }
    }

    fn inline_context(&self, parent_inline_hint: bool) -> bool {
        match &self.r#type {
            Some(r#type) => r#type.inline_content(),
            None => match self.content.first() {
                Some(first) => first.is_inline(),
                None => parent_inline_hint,
            },
        }
    }

    fn finish(mut self, open_end: bool) -> NodeOrFragment {
        if self.options & OPT_PRESERVE_WS == 0 {
            // Strip trailing whitespace
            let strip = match self.content.last().and_then(Node::as_text) {
                Some(text) => {
                    let trimmed = text.as_str().trim_end_matches(is_ws);
                    if trimmed.len() < text.as_str().len() {
                        Some(trimmed.to_owned())
                    } else {
                        None
                    }
                }
                None => None,
            };
            if let Some(trimmed) = strip {
                if trimmed.is_empty() {
                    self.content.pop();
                } else {
                    let last = self.content.last().unwrap().with_text(Text::from(trimmed));
                    *self.content.last_mut().unwrap() = last;
                }
            }
        }
        let mut content = Fragment::from(self.content);
        if !open_end {
            if let Some(r#match) = &self.r#match {
                if let Some(fill) = r#match.fill_before(&Fragment::default(), true, 0) {
                    content = content.append(fill);
                }
            }
        }
        match self.r#type {
            Some(r#type) => {
                let node = r#type
                    .create(self.attrs.as_ref(), content, Some(self.marks))
                    .expect("context attributes are validated when the context is opened");
                NodeOrFragment::Node(node)
            }
            None => NodeOrFragment::Fragment(content),
        }
    }
}

/// Whether a mark of this type could apply to some ancestor chain that admits
/// the given node type.
fn mark_may_apply(mark_type: &crate::schema::MarkType, node_type: &NodeType) -> bool {
    let schema = node_type.schema();
    for parent in schema.node_types() {
        if !parent.allows_mark_type(mark_type) {
            continue;
        }
        let mut seen: Vec<ContentMatch> = Vec::new();
        let mut queue = vec![parent.content_match()];
        while let Some(r#match) = queue.pop() {
            if seen.contains(&r#match) {
                continue;
            }
            for edge in 0..r#match.edge_count() {
                let (r#type, next) = r#match.edge(edge).unwrap();
                if &r#type == node_type {
                    return true;
                }
                queue.push(next);
            }
            seen.push(r#match);
        }
    }
    false
}

struct FindRecord<'a> {
    node: &'a dyn Dom,
    offset: usize,
    pos: Option<usize>,
}

struct ParseContext<'p, 'o> {
    parser: &'p DomParser,
    options: ParseOptions<'o>,
    is_open: bool,
    nodes: Vec<NodeContext>,
    open: usize,
    needs_block: bool,
    finds: Vec<FindRecord<'o>>,
    next_id: usize,
}

impl<'p, 'o> ParseContext<'p, 'o> {
    fn new(parser: &'p DomParser, mut options: ParseOptions<'o>, is_open: bool) -> Self {
        let top_options = ws_options_for(None, options.preserve_whitespace, 0)
            | if is_open { OPT_OPEN_LEFT } else { 0 };
        let top_context = if let Some(top_node) = options.top_node.take() {
            let r#match = options
                .top_match
                .take()
                .or_else(|| Some(top_node.r#type().content_match()));
            NodeContext::new(
                0,
                Some(top_node.r#type().clone()),
                Some(top_node.attrs().clone()),
                MarkSet::default(),
                Vec::new(),
                true,
                r#match,
                top_options,
            )
        } else if is_open {
            NodeContext::new(
                0,
                None,
                None,
                MarkSet::default(),
                Vec::new(),
                true,
                None,
                top_options,
            )
        } else {
            NodeContext::new(
                0,
                Some(parser.schema.top_node_type()),
                None,
                MarkSet::default(),
                Vec::new(),
                true,
                None,
                top_options,
            )
        };
        let finds = options
            .find_positions
            .iter()
            .map(|find| FindRecord {
                node: find.node,
                offset: find.offset,
                pos: None,
            })
            .collect();
        ParseContext {
            parser,
            options,
            is_open,
            nodes: vec![top_context],
            open: 0,
            needs_block: false,
            finds,
            next_id: 1,
        }
    }

    fn top(&mut self) -> &mut NodeContext {
        &mut self.nodes[self.open]
    }

    fn add_all(&mut self, parent: &'o dyn Dom, start_index: Option<usize>, end_index: Option<usize>) {
        let start = start_index.unwrap_or(0);
        let end = end_index.unwrap_or_else(|| parent.child_count());
        let normalize = self.parser.normalize_lists
            && parent.kind() == DomKind::Element
            && LIST_TAGS.contains(&parent.node_name());
        let mut index = start;
        while index < end {
            self.find_at_point(parent, index);
            let child = parent.child(index);
            let prev = if index > 0 {
                Some(parent.child(index - 1))
            } else {
                None
            };
            if normalize
                && child.kind() == DomKind::Element
                && child.node_name() == "li"
            {
                // A list nested directly inside a list gets attached to the
                // preceding list item, a kludge for source documents that
                // allow that shape.
                let mut extras: Vec<&'o dyn Dom> = Vec::new();
                let mut next = index + 1;
                while next < end {
                    let sibling = parent.child(next);
                    match sibling.kind() {
                        DomKind::Element if LIST_TAGS.contains(&sibling.node_name()) => {
                            extras.push(sibling);
                            next += 1;
                        }
                        DomKind::Text
                            if sibling
                                .node_value()
                                .map_or(false, |v| v.chars().all(is_ws))
                                && next + 1 < end
                                && parent.child(next + 1).kind() == DomKind::Element
                                && LIST_TAGS.contains(&parent.child(next + 1).node_name()) =>
                        {
                            next += 1;
                        }
                        _ => break,
                    }
                }
                self.add_element(child, None, &extras);
                index = next;
                continue;
            }
            self.add_dom(child, prev, parent);
            index += 1;
        }
        self.find_at_point(parent, index);
    }

    fn add_dom(&mut self, dom: &'o dyn Dom, prev: Option<&'o dyn Dom>, parent: &'o dyn Dom) {
        match dom.kind() {
            DomKind::Text => {
                let value = dom.node_value().unwrap_or("").to_owned();
                let parent_inline_hint = parent.kind() == DomKind::Element
                    && !BLOCK_TAGS.contains(&parent.node_name());
                self.add_text(&value, Some(dom), prev, parent_inline_hint);
            }
            DomKind::Element => self.add_element(dom, None, &[]),
            DomKind::Other => {}
        }
    }

    fn add_text(
        &mut self,
        value: &str,
        dom: Option<&'o dyn Dom>,
        prev: Option<&'o dyn Dom>,
        parent_inline_hint: bool,
    ) {
        let top = &self.nodes[self.open];
        let options = top.options;
        let keep = options & OPT_PRESERVE_WS_FULL != 0
            || top.inline_context(parent_inline_hint)
            || value.chars().any(|c| !is_ws(c));
        if !keep {
            if let Some(dom) = dom {
                self.find_inside(dom);
            }
            return;
        }
        let value = if options & OPT_PRESERVE_WS == 0 {
            let mut collapsed = collapse_ws(value);
            // Strip a leading space when there is no node before it, the
            // previous node was a <br>, or the text so far ends in whitespace
            if collapsed.starts_with(' ') && self.open == self.nodes.len() - 1 {
                let node_before = self.nodes[self.open].content.last();
                let br_before = matches!(prev, Some(p) if p.node_name() == "br");
                let strip = match node_before {
                    None => true,
                    Some(node) => {
                        br_before
                            || matches!(node.as_text(), Some(t) if t.as_str().ends_with(is_ws))
                    }
                };
                if strip {
                    collapsed.remove(0);
                }
            }
            collapsed
        } else if options & OPT_PRESERVE_WS_FULL == 0 {
            newlines_to_spaces(value)
        } else {
            normalize_crlf(value)
        };
        if !value.is_empty() {
            let text = self.parser.schema.text(value);
            self.insert_node(text);
        }
        if let Some(dom) = dom {
            self.find_in_text(dom);
        }
    }

    fn add_element(&mut self, dom: &'o dyn Dom, match_after: Option<usize>, extra: &[&'o dyn Dom]) {
        let parser = self.parser;
        let name = dom.node_name().to_owned();

        let (rule, rule_id) = match self
            .options
            .rule_from_node
            .as_ref()
            .and_then(|f| f(dom))
        {
            Some(rule) => (Some(rule), None),
            None => match parser.match_tag(dom, self, match_after) {
                Some((rule, id)) => (Some(rule), Some(id)),
                None => (None, None),
            },
        };

        let ignored = match &rule {
            Some(rule) => matches!(rule.action, Some(ParseAction::Ignore)),
            None => IGNORE_TAGS.contains(&name.as_str()),
        };
        if ignored {
            self.find_inside(dom);
            self.ignore_fallback(dom);
            return;
        }

        let structural = match &rule {
            None => true,
            Some(rule) => matches!(
                rule.action,
                None | Some(ParseAction::Skip) | Some(ParseAction::CloseParent)
            ),
        };
        if structural {
            if matches!(&rule, Some(r) if r.action == Some(ParseAction::CloseParent)) {
                self.open = self.open.saturating_sub(1);
            }
            let mut sync_id = None;
            let old_needs_block = self.needs_block;
            if BLOCK_TAGS.contains(&name.as_str()) {
                let starts_inline = self.nodes[self.open]
                    .content
                    .first()
                    .map_or(false, Node::is_inline);
                if starts_inline && self.open > 0 {
                    self.open -= 1;
                }
                sync_id = Some(self.nodes[self.open].id);
                if self.nodes[self.open].r#type.is_none() {
                    self.needs_block = true;
                }
            } else if dom.child_count() == 0 {
                self.leaf_fallback(dom);
                return;
            }
            let marks = match self.read_styles(dom) {
                Some(marks) => marks,
                None => return, // an ignoring style rule
            };
            let mark_level = self.nodes[self.open].id;
            for mark in &marks {
                self.add_pending_mark(mark.clone());
            }
            self.add_all(dom, None, None);
            for mark in &marks {
                self.remove_pending_mark(mark, mark_level);
            }
            if let Some(id) = sync_id {
                self.sync(id);
            }
            self.needs_block = old_needs_block;
        } else {
            let marks = match self.read_styles(dom) {
                Some(marks) => marks,
                None => return,
            };
            let mark_level = self.nodes[self.open].id;
            for mark in &marks {
                self.add_pending_mark(mark.clone());
            }
            let continue_after = match rule.as_ref().unwrap().consuming {
                Some(false) => rule_id,
                _ => None,
            };
            self.add_element_by_rule(dom, rule.unwrap(), continue_after, extra);
            for mark in &marks {
                self.remove_pending_mark(mark, mark_level);
            }
        }
    }

    /// Called for leaf elements that were not matched by any rule; a `<br>`
    /// in inline content becomes a newline character.
    fn leaf_fallback(&mut self, dom: &dyn Dom) {
        if dom.node_name() == "br"
            && matches!(&self.nodes[self.open].r#type, Some(t) if t.inline_content())
        {
            self.add_text("\n", None, None, false);
        }
    }

    /// Called for ignored elements; an ignored `<br>` outside of inline
    /// content still opens a default textblock.
    fn ignore_fallback(&mut self, dom: &dyn Dom) {
        if dom.node_name() == "br"
            && !matches!(&self.nodes[self.open].r#type, Some(t) if t.inline_content())
        {
            let probe = self.parser.schema.text("-");
            self.find_place(&probe);
        }
    }

    /// Run any style rules against the element's inline styles. Returns the
    /// marks to apply around its content, or `None` when a rule with an
    /// `Ignore` action matched.
    fn read_styles(&mut self, dom: &dyn Dom) -> Option<Vec<Mark>> {
        let parser = self.parser;
        let mut marks = Vec::new();
        for (prop, value) in dom.styles() {
            let mut after = None;
            loop {
                let (rule, id) = match parser.match_style(&prop, &value, self, after) {
                    Some(found) => found,
                    None => break,
                };
                match &rule.action {
                    Some(ParseAction::Ignore) => return None,
                    Some(ParseAction::Mark(name)) => {
                        if let Some(mark_type) = parser.schema.mark_type(name) {
                            if let Ok(mark) = mark_type.create(rule.attrs.as_ref()) {
                                marks.push(mark);
                            }
                        }
                    }
                    _ => {}
                }
                if rule.consuming == Some(false) {
                    after = Some(id);
                } else {
                    break;
                }
            }
        }
        Some(marks)
    }

    fn add_element_by_rule(
        &mut self,
        dom: &'o dyn Dom,
        rule: ParseRule,
        continue_after: Option<usize>,
        extra: &[&'o dyn Dom],
    ) {
        let parser = self.parser;
        let mut entered = false;
        let mut node_type: Option<NodeType> = None;
        let mut mark: Option<Mark> = None;
        match &rule.action {
            Some(ParseAction::Node(name)) => {
                let r#type = match parser.schema.node_type(name) {
                    Some(r#type) => r#type,
                    None => return,
                };
                if !r#type.is_leaf() {
                    entered =
                        self.enter(r#type.clone(), rule.attrs.as_ref(), rule.preserve_whitespace);
                    node_type = Some(r#type);
                } else {
                    let inserted = match r#type.create(rule.attrs.as_ref(), Fragment::default(), None)
                    {
                        Ok(leaf) => self.insert_node(leaf),
                        Err(_) => false,
                    };
                    if !inserted {
                        self.leaf_fallback(dom);
                    }
                    node_type = Some(r#type);
                }
            }
            Some(ParseAction::Mark(name)) => {
                if let Some(mark_type) = parser.schema.mark_type(name) {
                    if let Ok(created) = mark_type.create(rule.attrs.as_ref()) {
                        self.add_pending_mark(created.clone());
                        mark = Some(created);
                    }
                }
            }
            _ => {}
        }

        let start_id = self.nodes[self.open].id;
        if matches!(&node_type, Some(t) if t.is_leaf()) {
            self.find_inside(dom);
        } else if let Some(after) = continue_after {
            self.add_element(dom, Some(after), extra);
        } else if let Some(get_content) = &rule.get_content {
            self.find_inside(dom);
            for node in Vec::from(get_content(dom, &parser.schema)) {
                self.insert_node(node);
            }
        } else {
            let content_dom: &dyn Dom = match &rule.content_element {
                Some(ContentElement::Selector(selector)) => {
                    query_selector(dom, selector).unwrap_or(dom)
                }
                Some(ContentElement::Fn(locate)) => locate(dom),
                None => dom,
            };
            self.find_around(dom, content_dom, true);
            self.add_all(content_dom, None, None);
            for child in extra {
                self.add_element(*child, None, &[]);
            }
            self.find_around(dom, content_dom, false);
        }
        if entered && self.sync(start_id) {
            self.open = self.open.saturating_sub(1);
        }
        if let Some(mark) = mark {
            self.remove_pending_mark(&mark, start_id);
        }
    }

    /// Try to insert the given node into the document being built, wrapping
    /// it or synthesizing required parents as needed. Returns false (and
    /// drops the node) when no place for it can be found.
    fn insert_node(&mut self, node: Node) -> bool {
        if node.is_inline() && self.needs_block && self.nodes[self.open].r#type.is_none() {
            if let Some(block) = self.textblock_from_context() {
                self.enter_inner(block, None, false, None);
            }
        }
        if !self.find_place(&node) {
            return false;
        }
        self.close_extra(false);
        let top = &mut self.nodes[self.open];
        top.apply_pending(node.r#type());
        top.r#match = top
            .r#match
            .as_ref()
            .and_then(|r#match| r#match.match_type(node.r#type()));
        let mut marks = top.active_marks.clone();
        for mark in node.marks() {
            let allowed = match &top.r#type {
                Some(r#type) => r#type.allows_mark_type(&mark.r#type()),
                None => true,
            };
            if allowed {
                marks = mark.add_to_set(Cow::Owned(marks)).into_owned();
            }
        }
        top.content.push(node.mark(marks));
        true
    }

    /// Find a place to insert the given node, by wrapping as necessary.
    fn find_place(&mut self, node: &Node) -> bool {
        let mut route: Option<Vec<NodeType>> = None;
        let mut sync_depth = None;
        for depth in (0..=self.open).rev() {
            let context = &mut self.nodes[depth];
            if let Some(found) = context.find_wrapping(node) {
                let better = match &route {
                    None => true,
                    Some(route) => route.len() > found.len(),
                };
                if better {
                    let direct = found.is_empty();
                    route = Some(found);
                    sync_depth = Some(depth);
                    if direct {
                        break;
                    }
                }
            }
            if context.solid {
                break;
            }
        }
        let route = match route {
            Some(route) => route,
            None => return false,
        };
        self.open = sync_depth.unwrap();
        for wrapper in route {
            self.enter_inner(wrapper, None, false, None);
        }
        true
    }

    /// Try to start a node of the given type, adjusting the context when
    /// necessary.
    fn enter(
        &mut self,
        r#type: NodeType,
        attrs: Option<&Attrs>,
        preserve_ws: Option<PreserveWhitespace>,
    ) -> bool {
        let attrs = match r#type.compute_attrs(attrs) {
            Ok(attrs) => attrs,
            Err(_) => return false,
        };
        let probe = match r#type.create(Some(&attrs), Fragment::default(), None) {
            Ok(probe) => probe,
            Err(_) => return false,
        };
        if !self.find_place(&probe) {
            return false;
        }
        self.enter_inner(r#type, Some(attrs), true, preserve_ws);
        true
    }

    /// Open a node of the given type.
    fn enter_inner(
        &mut self,
        r#type: NodeType,
        attrs: Option<Attrs>,
        solid: bool,
        preserve_ws: Option<PreserveWhitespace>,
    ) {
        let id = self.next_id;
        self.next_id += 1;
        let top = &mut self.nodes[self.open];
        top.apply_pending(&r#type);
        top.r#match = top
            .r#match
            .as_ref()
            .and_then(|r#match| r#match.match_type(&r#type));
        let mut options = ws_options_for(Some(&r#type), preserve_ws, top.options);
        if top.options & OPT_OPEN_LEFT != 0 && top.content.is_empty() {
            options |= OPT_OPEN_LEFT;
        }
        let marks = top.active_marks.clone();
        let pending = top.pending_marks.clone();
        self.nodes.push(NodeContext::new(
            id,
            Some(r#type),
            attrs,
            marks,
            pending,
            solid,
            None,
            options,
        ));
        self.open += 1;
    }

    /// Remove any contexts above the current open level, finishing them into
    /// their parents.
    fn close_extra(&mut self, open_end: bool) {
        while self.nodes.len() - 1 > self.open {
            let context = self.nodes.pop().unwrap();
            match context.finish(open_end) {
                NodeOrFragment::Node(node) => {
                    self.nodes.last_mut().unwrap().content.push(node)
                }
                NodeOrFragment::Fragment(_) => {
                    unreachable!("only the top context can lack a type")
                }
            }
        }
    }

    fn finish(mut self) -> NodeOrFragment {
        self.open = 0;
        self.close_extra(self.is_open);
        self.nodes
            .pop()
            .expect("the top context is always present")
            .finish(self.is_open)
    }

    /// Set the current open level to the context with the given id, when it
    /// is still on the stack.
    fn sync(&mut self, id: usize) -> bool {
        for depth in (0..=self.open).rev() {
            if self.nodes[depth].id == id {
                self.open = depth;
                return true;
            }
        }
        false
    }

    fn add_pending_mark(&mut self, mark: Mark) {
        self.top().pending_marks.push(mark);
    }

    fn remove_pending_mark(&mut self, mark: &Mark, upto_id: usize) {
        for depth in (0..=self.open).rev() {
            let level = &mut self.nodes[depth];
            match level.pending_marks.iter().rposition(|m| m == mark) {
                Some(found) => {
                    level.pending_marks.remove(found);
                }
                None => {
                    level.active_marks.remove(mark);
                }
            }
            if level.id == upto_id {
                break;
            }
        }
    }

    /// The default textblock type to synthesize when inline content shows up
    /// where a block is expected. The ancestors named by the `context` option
    /// are consulted first, innermost out, before falling back to the first
    /// such type the schema declares.
    fn textblock_from_context(&self) -> Option<NodeType> {
        for name in self.options.context.iter().rev() {
            let ancestor = match self.parser.schema.node_type(name) {
                Some(ancestor) => ancestor,
                None => continue,
            };
            if let Some(deflt) = ancestor.content_match().default_type() {
                if deflt.is_textblock() && deflt.default_attrs().is_some() {
                    return Some(deflt);
                }
            }
        }
        self.parser
            .schema
            .node_types()
            .into_iter()
            .find(|r#type| r#type.is_textblock() && r#type.default_attrs().is_some())
    }

    /// Match a rule's context expression against the current parse stack.
    fn matches_context(&self, context: &str) -> bool {
        if context.contains('|') {
            return context
                .split('|')
                .any(|alternative| self.matches_context(alternative.trim()));
        }
        let parts: Vec<&str> = context.split('/').collect();
        let option = &self.options.context;
        let use_root = !self.is_open && option.is_empty();
        let min_depth = -(option.len() as isize) + if use_root { 0 } else { 1 };
        self.match_context_part(&parts, parts.len() as isize - 1, self.open as isize, min_depth, use_root)
    }

    fn match_context_part(
        &self,
        parts: &[&str],
        i: isize,
        depth: isize,
        min_depth: isize,
        use_root: bool,
    ) -> bool {
        if i < 0 {
            return true;
        }
        let part = parts[i as usize];
        if part.is_empty() {
            if i as usize == parts.len() - 1 || i == 0 {
                return self.match_context_part(parts, i - 1, depth, min_depth, use_root);
            }
            // `//` matches any chain of ancestors
            let mut d = depth;
            while d >= min_depth {
                if self.match_context_part(parts, i - 1, d, min_depth, use_root) {
                    return true;
                }
                d -= 1;
            }
            false
        } else {
            let matched = if depth > 0 || (depth == 0 && use_root) {
                match &self.nodes[depth as usize].r#type {
                    Some(r#type) => {
                        r#type.name() == part || r#type.groups().iter().any(|g| g == part)
                    }
                    None => false,
                }
            } else if depth >= min_depth {
                let index = (depth - min_depth) as usize;
                self.options.context.get(index).map(String::as_str) == Some(part)
            } else {
                false
            };
            if !matched {
                return false;
            }
            self.match_context_part(parts, i - 1, depth - 1, min_depth, use_root)
        }
    }

    // === Position tracking ===

    fn current_pos(&mut self) -> usize {
        self.close_extra(false);
        let mut pos = 0;
        for depth in (0..=self.open).rev() {
            pos += self.nodes[depth]
                .content
                .iter()
                .map(Node::node_size)
                .sum::<usize>();
            if depth > 0 {
                pos += 1;
            }
        }
        pos
    }

    fn find_at_point(&mut self, parent: &dyn Dom, offset: usize) {
        if self.finds.is_empty() {
            return;
        }
        let mut matched = Vec::new();
        for (i, find) in self.finds.iter().enumerate() {
            if find.pos.is_none() && parent.same_node(find.node) && find.offset == offset {
                matched.push(i);
            }
        }
        if !matched.is_empty() {
            let pos = self.current_pos();
            for i in matched {
                self.finds[i].pos = Some(pos);
            }
        }
    }

    fn find_inside(&mut self, parent: &dyn Dom) {
        if self.finds.is_empty() || parent.kind() != DomKind::Element {
            return;
        }
        let mut matched = Vec::new();
        for (i, find) in self.finds.iter().enumerate() {
            if find.pos.is_none() && parent.contains(find.node) {
                matched.push(i);
            }
        }
        if !matched.is_empty() {
            let pos = self.current_pos();
            for i in matched {
                self.finds[i].pos = Some(pos);
            }
        }
    }

    fn find_around(&mut self, parent: &dyn Dom, content: &dyn Dom, before: bool) {
        if self.finds.is_empty() || parent.same_node(content) || parent.kind() != DomKind::Element
        {
            return;
        }
        let mut matched = Vec::new();
        for (i, find) in self.finds.iter().enumerate() {
            if find.pos.is_none() && parent.contains(find.node) {
                let found_preceding = precedes(parent, find.node, content);
                if found_preceding == Some(before) {
                    matched.push(i);
                }
            }
        }
        if !matched.is_empty() {
            let pos = self.current_pos();
            for i in matched {
                self.finds[i].pos = Some(pos);
            }
        }
    }

    fn find_in_text(&mut self, text_dom: &dyn Dom) {
        if self.finds.is_empty() {
            return;
        }
        let len = text_dom
            .node_value()
            .map(|value| value.encode_utf16().count())
            .unwrap_or(0);
        let mut matched = Vec::new();
        for (i, find) in self.finds.iter().enumerate() {
            if find.pos.is_none() && text_dom.same_node(find.node) {
                matched.push(i);
            }
        }
        if !matched.is_empty() {
            let pos = self.current_pos();
            for i in matched {
                let offset = self.finds[i].offset;
                self.finds[i].pos = Some(pos.saturating_sub(len - offset.min(len)));
            }
        }
    }
}

/// Whether `a` comes before `b` in document order under `root`. `None` when
/// either is not found.
fn precedes(root: &dyn Dom, a: &dyn Dom, b: &dyn Dom) -> Option<bool> {
    let mut counter = 0;
    let order_a = dfs_order(root, a, &mut counter)?;
    let mut counter = 0;
    let order_b = dfs_order(root, b, &mut counter)?;
    Some(order_a < order_b)
}

fn dfs_order(root: &dyn Dom, target: &dyn Dom, counter: &mut usize) -> Option<usize> {
    if root.same_node(target) {
        return Some(*counter);
    }
    *counter += 1;
    for i in 0..root.child_count() {
        if let Some(found) = dfs_order(root.child(i), target, counter) {
            return Some(found);
        }
    }
    None
}
