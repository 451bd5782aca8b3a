//! # Content expressions
//!
//! Every node type carries a content expression, a regular-expression-like
//! language over child node types (`"paragraph block*"`, `"(text | image)*"`,
//! `"heading{1,2}"`). Expressions are parsed to an AST, lowered to an NFA and
//! subset-constructed into a DFA whose states are [`ContentMatch`] values.

use crate::fragment::Fragment;
use crate::schema::{NodeType, Schema};
use displaydoc::Display;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while compiling a content expression
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum ContentError {
    /// Unexpected token `{token}` in content expression `{expr}`
    UnexpectedToken {
        /// The offending token
        token: String,
        /// The full expression
        expr: String,
    },
    /// Unexpected end of content expression `{expr}`
    UnexpectedEnd {
        /// The full expression
        expr: String,
    },
    /// No node type or group `{name}` found in content expression `{expr}`
    UnknownType {
        /// The name that did not resolve
        name: String,
        /// The full expression
        expr: String,
    },
    /// Mixing inline and block content in content expression `{expr}`
    MixedContent {
        /// The full expression
        expr: String,
    },
    /// A quantifier may not have a zero count in content expression `{expr}`
    ZeroQuantifier {
        /// The full expression
        expr: String,
    },
    /// Ambiguous optional term before `{name}` in content expression `{expr}`
    Ambiguous {
        /// A type that both terms admit
        name: String,
        /// The full expression
        expr: String,
    },
    /// Only non-generatable nodes ({nodes}) in a required position in `{expr}`
    DeadEnd {
        /// The candidate type names
        nodes: String,
        /// The full expression
        expr: String,
    },
}

/// Error on content matching
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum ContentMatchError {
    /// Called contentMatchAt on a node with invalid content
    InvalidContent,
}

/// The static per-type facts the compiler needs, extracted by the schema
/// builder before any content expression is compiled.
pub(crate) struct TypeMeta {
    pub name: String,
    pub groups: Vec<String>,
    pub inline: bool,
    pub is_text: bool,
    pub has_required_attrs: bool,
}

/// A compiled DFA. State 0 is the entry state.
pub(crate) struct MatchArena {
    pub states: Vec<MatchState>,
}

pub(crate) struct MatchState {
    pub valid_end: bool,
    /// `(node type index, next state)` pairs, in expression order
    pub next: Vec<(usize, usize)>,
}

/// Instances of this type represent a match state of a node type's content
/// expression, and can be used to find out whether further content matches
/// here, and whether a given position is a valid end of the node.
#[derive(Clone)]
pub struct ContentMatch {
    pub(crate) schema: Schema,
    pub(crate) arena: Arc<MatchArena>,
    pub(crate) state: usize,
}

impl PartialEq for ContentMatch {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena) && self.state == other.state
    }
}

impl Eq for ContentMatch {}

impl fmt::Debug for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentMatch({})", self)
    }
}

impl fmt::Display for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node();
        if state.valid_end {
            f.write_str("*")?;
        }
        let mut first = true;
        for (type_index, next) in &state.next {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(
                f,
                "{} -> {}",
                self.schema.data.nodes[*type_index].name, next
            )?;
        }
        Ok(())
    }
}

impl ContentMatch {
    pub(crate) fn new(schema: Schema, arena: Arc<MatchArena>, state: usize) -> Self {
        ContentMatch {
            schema,
            arena,
            state,
        }
    }

    fn node(&self) -> &MatchState {
        &self.arena.states[self.state]
    }

    fn at(&self, state: usize) -> Self {
        ContentMatch::new(self.schema.clone(), self.arena.clone(), state)
    }

    /// True when this match state represents a valid end of the node.
    pub fn valid_end(&self) -> bool {
        self.node().valid_end
    }

    /// Match a node type, returning a match after that node if successful.
    pub fn match_type(&self, r#type: &NodeType) -> Option<Self> {
        self.node()
            .next
            .iter()
            .find(|(index, _)| *index == r#type.index)
            .map(|(_, state)| self.at(*state))
    }

    /// Try to match a fragment. Returns the resulting match when successful.
    pub fn match_fragment(&self, fragment: &Fragment) -> Option<Self> {
        self.match_fragment_range(fragment, ..)
    }

    /// Try to match a range of a fragment's children (by child index).
    /// Returns the resulting match when successful.
    pub fn match_fragment_range<R: RangeBounds<usize>>(
        &self,
        fragment: &Fragment,
        range: R,
    ) -> Option<Self> {
        let start = crate::util::from(&range);
        let end = crate::util::to(&range, fragment.child_count());

        let mut state = self.state;
        for child in &fragment.children()[start..end] {
            let next = self.arena.states[state]
                .next
                .iter()
                .find(|(index, _)| *index == child.r#type().index)?;
            state = next.1;
        }
        Some(self.at(state))
    }

    /// The number of outgoing edges this node has in the finite automaton
    /// that describes the content expression.
    pub fn edge_count(&self) -> usize {
        self.node().next.len()
    }

    /// Get the _n_'th outgoing edge from this node in the finite automaton
    /// that describes the content expression.
    pub fn edge(&self, n: usize) -> Option<(NodeType, ContentMatch)> {
        let (type_index, state) = *self.node().next.get(n)?;
        Some((self.schema.node_type_at(type_index), self.at(state)))
    }

    /// Get the first matching node type at this match position that can be
    /// generated without user-supplied attributes.
    pub fn default_type(&self) -> Option<NodeType> {
        for (type_index, _) in &self.node().next {
            let data = &self.schema.data.nodes[*type_index];
            if !data.is_text() && !data.has_required_attrs() {
                return Some(self.schema.node_type_at(*type_index));
            }
        }
        None
    }

    /// True when both states admit some shared node type, which makes the two
    /// expressions joinable at this point.
    pub fn compatible(&self, other: &ContentMatch) -> bool {
        self.node().next.iter().any(|(index, _)| {
            other
                .node()
                .next
                .iter()
                .any(|(other_index, _)| index == other_index)
        })
    }

    /// Try to match the given fragment, and if that fails, see if it can be
    /// made to match by inserting nodes in front of it. When successful,
    /// return a fragment of inserted nodes (which may be empty if nothing had
    /// to be inserted). When `to_end` is true, only return a fragment if the
    /// resulting match goes to the end of the content expression.
    pub fn fill_before(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
    ) -> Option<Fragment> {
        // Breadth-first search over DFA states keeps the filler minimal.
        let mut seen = vec![self.state];
        let mut queue: Vec<(usize, Vec<usize>)> = vec![(self.state, Vec::new())];
        let mut head = 0;
        while head < queue.len() {
            let (state, types) = queue[head].clone();
            head += 1;

            if let Some(finished) = self.at(state).match_fragment_range(after, start_index..) {
                if !to_end || finished.valid_end() {
                    let mut filled = Vec::with_capacity(types.len());
                    let mut ok = true;
                    for type_index in &types {
                        match self.schema.node_type_at(*type_index).create_and_fill(
                            None,
                            Fragment::default(),
                            None,
                        ) {
                            Some(node) => filled.push(node),
                            None => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if ok {
                        return Some(Fragment::from(filled));
                    }
                }
            }
            for (type_index, next) in &self.arena.states[state].next {
                let data = &self.schema.data.nodes[*type_index];
                if !data.is_text() && !data.has_required_attrs() && !seen.contains(next) {
                    seen.push(*next);
                    let mut extended = types.clone();
                    extended.push(*type_index);
                    queue.push((*next, extended));
                }
            }
        }
        None
    }

    /// Find a set of wrapping node types that would allow a node of the given
    /// type to appear at this position. The result may be empty (when it fits
    /// directly) and will be `None` when no such wrapping exists.
    pub fn find_wrapping(&self, target: &NodeType) -> Option<Vec<NodeType>> {
        let key = (
            Arc::as_ptr(&self.arena) as usize,
            self.state,
            target.index,
        );
        {
            let cache = self.schema.data.wrap_cache.lock().unwrap();
            if let Some(cached) = cache.get(&key) {
                return cached.as_ref().map(|route| {
                    route
                        .iter()
                        .map(|index| self.schema.node_type_at(*index))
                        .collect()
                });
            }
        }
        let computed = self.compute_wrapping(target);
        self.schema
            .data
            .wrap_cache
            .lock()
            .unwrap()
            .insert(key, computed.clone());
        computed.map(|route| {
            route
                .iter()
                .map(|index| self.schema.node_type_at(*index))
                .collect()
        })
    }

    fn compute_wrapping(&self, target: &NodeType) -> Option<Vec<usize>> {
        // Breadth-first over candidate wrapper types, so the shortest route
        // wins. `via` links each queue entry back to its parent entry.
        struct Active {
            arena: Arc<MatchArena>,
            state: usize,
            r#type: Option<usize>,
            via: usize,
        }
        let mut seen: Vec<usize> = Vec::new();
        let mut active = vec![Active {
            arena: self.arena.clone(),
            state: self.state,
            r#type: None,
            via: 0,
        }];
        let mut head = 0;
        while head < active.len() {
            let current = head;
            head += 1;
            let state = &active[current].arena.states[active[current].state];
            if state
                .next
                .iter()
                .any(|(index, _)| *index == target.index)
            {
                let mut route = Vec::new();
                let mut entry = current;
                while let Some(type_index) = active[entry].r#type {
                    route.push(type_index);
                    entry = active[entry].via;
                }
                route.reverse();
                return Some(route);
            }
            let in_wrapper = active[current].r#type.is_some();
            let arena = active[current].arena.clone();
            for (type_index, next) in &arena.states[active[current].state].next {
                let data = &self.schema.data.nodes[*type_index];
                if !data.is_leaf()
                    && !data.has_required_attrs()
                    && !seen.contains(type_index)
                    && (!in_wrapper || arena.states[*next].valid_end)
                {
                    seen.push(*type_index);
                    active.push(Active {
                        arena: data.content_match.clone(),
                        state: 0,
                        r#type: Some(*type_index),
                        via: current,
                    });
                }
            }
        }
        None
    }
}

// === Expression compiler ===

enum Expr {
    Choice(Vec<Expr>),
    Seq(Vec<Expr>),
    Star(Box<Expr>),
    Plus(Box<Expr>),
    Opt(Box<Expr>),
    Range {
        min: usize,
        max: Option<usize>,
        expr: Box<Expr>,
    },
    Name(usize),
}

struct TokenStream<'a> {
    expr: &'a str,
    tokens: Vec<String>,
    pos: usize,
    types: &'a [TypeMeta],
    inline: Option<bool>,
}

impl<'a> TokenStream<'a> {
    fn new(expr: &'a str, types: &'a [TypeMeta]) -> Self {
        let mut tokens = Vec::new();
        let mut word = String::new();
        for c in expr.chars() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
            } else {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                if !c.is_whitespace() {
                    tokens.push(c.to_string());
                }
            }
        }
        if !word.is_empty() {
            tokens.push(word);
        }
        TokenStream {
            expr,
            tokens,
            pos: 0,
            types,
            inline: None,
        }
    }

    fn next(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.next() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected<T>(&self) -> Result<T, ContentError> {
        match self.next() {
            Some(token) => Err(ContentError::UnexpectedToken {
                token: token.to_owned(),
                expr: self.expr.to_owned(),
            }),
            None => Err(ContentError::UnexpectedEnd {
                expr: self.expr.to_owned(),
            }),
        }
    }
}

fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ContentError> {
    let mut exprs = vec![parse_expr_seq(stream)?];
    while stream.eat("|") {
        exprs.push(parse_expr_seq(stream)?);
    }
    Ok(if exprs.len() == 1 {
        exprs.pop().unwrap()
    } else {
        Expr::Choice(exprs)
    })
}

fn parse_expr_seq(stream: &mut TokenStream) -> Result<Expr, ContentError> {
    let mut exprs = vec![parse_expr_subscript(stream)?];
    while matches!(stream.next(), Some(token) if token != ")" && token != "|") {
        exprs.push(parse_expr_subscript(stream)?);
    }
    check_unambiguous(&exprs, stream)?;
    Ok(if exprs.len() == 1 {
        exprs.pop().unwrap()
    } else {
        Expr::Seq(exprs)
    })
}

fn parse_expr_subscript(stream: &mut TokenStream) -> Result<Expr, ContentError> {
    let mut expr = parse_expr_atom(stream)?;
    loop {
        if stream.eat("+") {
            expr = Expr::Plus(Box::new(expr));
        } else if stream.eat("*") {
            expr = Expr::Star(Box::new(expr));
        } else if stream.eat("?") {
            expr = Expr::Opt(Box::new(expr));
        } else if stream.eat("{") {
            expr = parse_expr_range(stream, expr)?;
        } else {
            break;
        }
    }
    Ok(expr)
}

fn parse_num(stream: &mut TokenStream) -> Result<usize, ContentError> {
    // A count that does not fit in usize is as malformed as a non-number
    let num = match stream.next() {
        Some(token) if token.chars().all(|c| c.is_ascii_digit()) => match token.parse() {
            Ok(num) => num,
            Err(_) => return stream.unexpected(),
        },
        _ => return stream.unexpected(),
    };
    stream.pos += 1;
    Ok(num)
}

fn parse_expr_range(stream: &mut TokenStream, expr: Expr) -> Result<Expr, ContentError> {
    let min = parse_num(stream)?;
    let max = if stream.eat(",") {
        if stream.next() == Some("}") {
            None
        } else {
            Some(parse_num(stream)?)
        }
    } else {
        Some(min)
    };
    if !stream.eat("}") {
        return stream.unexpected();
    }
    if max == Some(0) || matches!(max, Some(max) if max < min) {
        return Err(ContentError::ZeroQuantifier {
            expr: stream.expr.to_owned(),
        });
    }
    Ok(Expr::Range {
        min,
        max,
        expr: Box::new(expr),
    })
}

fn resolve_name(stream: &TokenStream, name: &str) -> Result<Vec<usize>, ContentError> {
    let mut found = Vec::new();
    for (index, meta) in stream.types.iter().enumerate() {
        if meta.name == name {
            return Ok(vec![index]);
        }
        if meta.groups.iter().any(|group| group == name) {
            found.push(index);
        }
    }
    if found.is_empty() {
        Err(ContentError::UnknownType {
            name: name.to_owned(),
            expr: stream.expr.to_owned(),
        })
    } else {
        Ok(found)
    }
}

fn parse_expr_atom(stream: &mut TokenStream) -> Result<Expr, ContentError> {
    if stream.eat("(") {
        let mut exprs = vec![parse_expr_seq(stream)?];
        while stream.eat("|") {
            exprs.push(parse_expr_seq(stream)?);
        }
        if !stream.eat(")") {
            return stream.unexpected();
        }
        Ok(if exprs.len() == 1 {
            exprs.pop().unwrap()
        } else {
            Expr::Choice(exprs)
        })
    } else {
        let name = match stream.next() {
            Some(token) if token.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                token.to_owned()
            }
            _ => return stream.unexpected(),
        };
        let resolved = resolve_name(stream, &name)?;
        let mut exprs = Vec::with_capacity(resolved.len());
        for index in resolved {
            let inline = stream.types[index].inline;
            match stream.inline {
                None => stream.inline = Some(inline),
                Some(seen) if seen != inline => {
                    return Err(ContentError::MixedContent {
                        expr: stream.expr.to_owned(),
                    })
                }
                _ => {}
            }
            exprs.push(Expr::Name(index));
        }
        stream.pos += 1;
        Ok(if exprs.len() == 1 {
            exprs.pop().unwrap()
        } else {
            Expr::Choice(exprs)
        })
    }
}

/// The set of types an expression can start with.
fn first_types(expr: &Expr, out: &mut Vec<usize>) {
    match expr {
        Expr::Choice(exprs) => {
            for expr in exprs {
                first_types(expr, out);
            }
        }
        Expr::Seq(exprs) => {
            for expr in exprs {
                first_types(expr, out);
                if !nullable(expr) {
                    break;
                }
            }
        }
        Expr::Star(inner) | Expr::Plus(inner) | Expr::Opt(inner) => first_types(inner, out),
        Expr::Range { expr, .. } => first_types(expr, out),
        Expr::Name(index) => {
            if !out.contains(index) {
                out.push(*index);
            }
        }
    }
}

fn nullable(expr: &Expr) -> bool {
    match expr {
        Expr::Choice(exprs) => exprs.iter().any(nullable),
        Expr::Seq(exprs) => exprs.iter().all(nullable),
        Expr::Star(_) | Expr::Opt(_) => true,
        Expr::Plus(inner) => nullable(inner),
        Expr::Range { min, expr, .. } => *min == 0 || nullable(expr),
        Expr::Name(_) => false,
    }
}

/// An optional term directly followed by a term admitting one of the same
/// types makes the expression ambiguous (`paragraph? paragraph`). Such
/// expressions are rejected outright.
fn check_unambiguous(exprs: &[Expr], stream: &TokenStream) -> Result<(), ContentError> {
    for pair in exprs.windows(2) {
        if nullable(&pair[0]) {
            let mut left = Vec::new();
            let mut right = Vec::new();
            first_types(&pair[0], &mut left);
            first_types(&pair[1], &mut right);
            if let Some(shared) = left.iter().find(|index| right.contains(index)) {
                return Err(ContentError::Ambiguous {
                    name: stream.types[*shared].name.clone(),
                    expr: stream.expr.to_owned(),
                });
            }
        }
    }
    Ok(())
}

// === NFA construction ===

#[derive(Clone, Copy)]
struct NfaEdge {
    term: Option<usize>,
    to: Option<usize>,
}

struct Nfa {
    nodes: Vec<Vec<NfaEdge>>,
}

impl Nfa {
    fn node(&mut self) -> usize {
        self.nodes.push(Vec::new());
        self.nodes.len() - 1
    }

    fn edge(&mut self, from: usize, to: Option<usize>, term: Option<usize>) -> (usize, usize) {
        self.nodes[from].push(NfaEdge { term, to });
        (from, self.nodes[from].len() - 1)
    }

    fn connect(&mut self, edges: &[(usize, usize)], to: usize) {
        for (node, edge) in edges {
            self.nodes[*node][*edge].to = Some(to);
        }
    }

    fn compile(&mut self, expr: &Expr, from: usize) -> Vec<(usize, usize)> {
        match expr {
            Expr::Choice(exprs) => exprs
                .iter()
                .flat_map(|expr| self.compile(expr, from))
                .collect(),
            Expr::Seq(exprs) => {
                let mut from = from;
                for (i, expr) in exprs.iter().enumerate() {
                    let next = self.compile(expr, from);
                    if i == exprs.len() - 1 {
                        return next;
                    }
                    from = self.node();
                    self.connect(&next, from);
                }
                unreachable!("sequences are never empty")
            }
            Expr::Star(inner) => {
                let r#loop = self.node();
                self.edge(from, Some(r#loop), None);
                let inner_edges = self.compile(inner, r#loop);
                self.connect(&inner_edges, r#loop);
                vec![self.edge(r#loop, None, None)]
            }
            Expr::Plus(inner) => {
                let r#loop = self.node();
                let first = self.compile(inner, from);
                self.connect(&first, r#loop);
                let rest = self.compile(inner, r#loop);
                self.connect(&rest, r#loop);
                vec![self.edge(r#loop, None, None)]
            }
            Expr::Opt(inner) => {
                let mut edges = vec![self.edge(from, None, None)];
                edges.extend(self.compile(inner, from));
                edges
            }
            Expr::Range { min, max, expr } => {
                let mut cur = from;
                for _ in 0..*min {
                    let next = self.node();
                    let edges = self.compile(expr, cur);
                    self.connect(&edges, next);
                    cur = next;
                }
                match max {
                    None => {
                        let edges = self.compile(expr, cur);
                        self.connect(&edges, cur);
                    }
                    Some(max) => {
                        for _ in *min..*max {
                            let next = self.node();
                            self.edge(cur, Some(next), None);
                            let edges = self.compile(expr, cur);
                            self.connect(&edges, next);
                            cur = next;
                        }
                    }
                }
                vec![self.edge(cur, None, None)]
            }
            Expr::Name(index) => vec![self.edge(from, None, Some(*index))],
        }
    }
}

/// States reachable from `node` by only ε edges, in a canonical order.
fn null_from(nfa: &Nfa, node: usize, result: &mut Vec<usize>) {
    let edges = &nfa.nodes[node];
    if edges.len() == 1 && edges[0].term.is_none() {
        return null_from(nfa, edges[0].to.unwrap(), result);
    }
    result.push(node);
    for edge in edges {
        if edge.term.is_none() {
            let to = edge.to.unwrap();
            if !result.contains(&to) {
                null_from(nfa, to, result);
            }
        }
    }
}

fn closure(nfa: &Nfa, node: usize) -> Vec<usize> {
    let mut result = Vec::new();
    null_from(nfa, node, &mut result);
    result.sort_unstable();
    result
}

fn dfa(nfa: &Nfa) -> MatchArena {
    let accepting = nfa.nodes.len() - 1;
    let mut arena = MatchArena { states: Vec::new() };
    let mut labeled: HashMap<Vec<usize>, usize> = HashMap::new();
    explore(nfa, closure(nfa, 0), accepting, &mut arena, &mut labeled);
    arena
}

fn explore(
    nfa: &Nfa,
    states: Vec<usize>,
    accepting: usize,
    arena: &mut MatchArena,
    labeled: &mut HashMap<Vec<usize>, usize>,
) -> usize {
    let mut out: Vec<(usize, Vec<usize>)> = Vec::new();
    for node in &states {
        for edge in &nfa.nodes[*node] {
            let term = match edge.term {
                Some(term) => term,
                None => continue,
            };
            let entry = match out.iter().position(|(t, _)| *t == term) {
                Some(entry) => entry,
                None => {
                    out.push((term, Vec::new()));
                    out.len() - 1
                }
            };
            let set = &mut out[entry].1;
            for reached in closure(nfa, edge.to.unwrap()) {
                if !set.contains(&reached) {
                    set.push(reached);
                }
            }
        }
    }
    let index = arena.states.len();
    arena.states.push(MatchState {
        valid_end: states.contains(&accepting),
        next: Vec::new(),
    });
    labeled.insert(states, index);
    for (term, mut set) in out {
        set.sort_unstable();
        let target = match labeled.get(&set) {
            Some(existing) => *existing,
            None => explore(nfa, set, accepting, arena, labeled),
        };
        arena.states[index].next.push((term, target));
    }
    index
}

/// Compile a content expression into its DFA. An empty expression compiles to
/// a single accepting state with no transitions, which is what makes its node
/// type a leaf.
pub(crate) fn compile(expr: &str, types: &[TypeMeta]) -> Result<MatchArena, ContentError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Ok(MatchArena {
            states: vec![MatchState {
                valid_end: true,
                next: Vec::new(),
            }],
        });
    }
    let mut stream = TokenStream::new(trimmed, types);
    let parsed = parse_expr(&mut stream)?;
    if stream.next().is_some() {
        return stream.unexpected();
    }
    let mut nfa = Nfa {
        nodes: vec![Vec::new()],
    };
    let dangling = nfa.compile(&parsed, 0);
    let end = nfa.node();
    nfa.connect(&dangling, end);
    let arena = dfa(&nfa);
    check_for_dead_ends(&arena, trimmed, types)?;
    Ok(arena)
}

/// A state that is not a valid end and from which every outgoing type is
/// non-generatable can never be completed by `fill_before`. Such expressions
/// are rejected when the schema is compiled.
fn check_for_dead_ends(
    arena: &MatchArena,
    expr: &str,
    types: &[TypeMeta],
) -> Result<(), ContentError> {
    for state in &arena.states {
        if state.valid_end {
            continue;
        }
        let generatable = state.next.iter().any(|(index, _)| {
            let meta = &types[*index];
            !meta.is_text && !meta.has_required_attrs
        });
        if !generatable {
            let nodes = state
                .next
                .iter()
                .map(|(index, _)| types[*index].name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ContentError::DeadEnd {
                nodes,
                expr: expr.to_owned(),
            });
        }
    }
    Ok(())
}
