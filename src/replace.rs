//! # The replace algorithm

use crate::fragment::Fragment;
use crate::node::Node;
use crate::resolved_pos::{ResolveError, ResolvedPos};
use crate::schema::NodeType;
use crate::slice::Slice;
use crate::util::EitherOrBoth;
use displaydoc::Display;
use std::borrow::Cow;
use thiserror::Error;

/// An error that can occur when replacing a slice
#[derive(Debug, Clone, Display, Error, PartialEq, Eq)]
pub enum ReplaceError {
    /// Inserted content deeper than insertion position
    InsertTooDeep,
    /// Inconsistent open depths
    InconsistentOpenDepths {
        /// Depth at the start
        from_depth: usize,
        /// How many nodes are "open" at the start
        open_start: usize,
        /// Depth at the end
        to_depth: usize,
        /// How many nodes are "open" at the end
        open_end: usize,
    },
    /// Could not resolve an index
    Resolve(#[from] ResolveError),
    /// Cannot join {0:?} onto {1:?}
    CannotJoin(NodeType, NodeType),
    /// Invalid content for node {0:?}
    InvalidContent(NodeType),
}

pub(crate) fn replace(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    slice: &Slice,
) -> Result<Node, ReplaceError> {
    if slice.open_start() > rp_from.depth() {
        Err(ReplaceError::InsertTooDeep)
    } else if rp_from.depth() - slice.open_start() != rp_to.depth() - slice.open_end() {
        Err(ReplaceError::InconsistentOpenDepths {
            from_depth: rp_from.depth(),
            open_start: slice.open_start(),
            to_depth: rp_to.depth(),
            open_end: slice.open_end(),
        })
    } else {
        replace_outer(rp_from, rp_to, slice, 0)
    }
}

fn replace_outer(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    slice: &Slice,
    depth: usize,
) -> Result<Node, ReplaceError> {
    let index = rp_from.index(depth);
    let node = rp_from.node(depth);
    if index == rp_to.index(depth) && depth < rp_from.depth() - slice.open_start() {
        // Both endpoints fall inside the same child, and no open node of the
        // slice ends at this depth yet.
        let inner = replace_outer(rp_from, rp_to, slice, depth + 1)?;
        Ok(node.copy(|c| c.replace_child(index, inner).into_owned()))
    } else if slice.content().size() == 0 {
        // Pure deletion
        let content = replace_two_way(rp_from, rp_to, depth)?;
        close(node, content)
    } else if slice.open_start() == 0
        && slice.open_end() == 0
        && rp_from.depth() == depth
        && rp_to.depth() == depth
    {
        // Simple, flat case: a closed slice spliced directly into one parent
        let parent = rp_from.parent();
        let content = parent.content();

        let new_content = content
            .cut(0..rp_from.parent_offset())
            .append(slice.content().clone())
            .append(content.cut(rp_to.parent_offset()..));
        close(parent, new_content)
    } else {
        let (node_for_slice, start, end) = prepare_slice_for_replace(slice, rp_from);
        let rp_start = node_for_slice.resolve(start)?;
        let rp_end = node_for_slice.resolve(end)?;
        let content = replace_three_way(rp_from, &rp_start, &rp_end, rp_to, depth)?;
        close(node, content)
    }
}

fn check_join(main: &Node, sub: &Node) -> Result<(), ReplaceError> {
    if sub.r#type().compatible_content(main.r#type()) {
        Ok(())
    } else {
        Err(ReplaceError::CannotJoin(
            sub.r#type().clone(),
            main.r#type().clone(),
        ))
    }
}

fn joinable<'a>(
    rp_before: &ResolvedPos<'a>,
    rp_after: &ResolvedPos<'a>,
    depth: usize,
) -> Result<&'a Node, ReplaceError> {
    let node = rp_before.node(depth);
    check_join(node, rp_after.node(depth))?;
    Ok(node)
}

fn add_node(child: Cow<Node>, target: &mut Vec<Node>) {
    if let Some(last) = target.last_mut() {
        if let (Some(last_text), Some(child_text)) = (last.as_text(), child.as_text()) {
            if last.marks() == child.marks() {
                let merged = child.with_text(last_text.join(child_text));
                *last = merged;
                return;
            }
        }
    }
    target.push(child.into_owned());
}

type Range<'b, 'a> = EitherOrBoth<&'b ResolvedPos<'a>, &'b ResolvedPos<'a>>;

fn add_range(range: Range, depth: usize, target: &mut Vec<Node>) {
    let node = range.right_or_left().node(depth);
    let mut start_index = 0;

    let end_index = if let Some(rp_end) = range.right() {
        rp_end.index(depth)
    } else {
        node.child_count()
    };

    if let Some(rp_start) = range.left() {
        start_index = rp_start.index(depth);
        if rp_start.depth() > depth {
            start_index += 1;
        } else if rp_start.text_offset() > 0 {
            add_node(rp_start.node_after().unwrap(), target);
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(Cow::Borrowed(node.child(i)), target);
    }
    if let Some(rp_end) = range.right() {
        if rp_end.depth() == depth && rp_end.text_offset() > 0 {
            add_node(rp_end.node_before().unwrap(), target);
        }
    }
}

/// Close a node over new content, re-validating it. A child sequence that
/// matches a prefix of the content expression but stops short of an accepting
/// state is completed with the minimal required filler.
fn close(node: &Node, content: Fragment) -> Result<Node, ReplaceError> {
    let r#type = node.r#type();
    if r#type.valid_content(&content) {
        return Ok(node.copy(move |_| content));
    }
    if let Some(matched) = r#type.content_match().match_fragment(&content) {
        if !matched.valid_end() {
            if let Some(fill) = matched.fill_before(&Fragment::default(), true, 0) {
                let filled = content.append(fill);
                if r#type.valid_content(&filled) {
                    return Ok(node.copy(move |_| filled));
                }
            }
        }
    }
    Err(ReplaceError::InvalidContent(r#type.clone()))
}

fn replace_three_way(
    rp_from: &ResolvedPos,
    rp_start: &ResolvedPos,
    rp_end: &ResolvedPos,
    rp_to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let open_start = if rp_from.depth() > depth {
        Some(joinable(rp_from, rp_start, depth + 1)?)
    } else {
        None
    };
    let open_end = if rp_to.depth() > depth {
        Some(joinable(rp_end, rp_to, depth + 1)?)
    } else {
        None
    };

    let mut content = Vec::new();
    add_range(Range::Right(rp_from), depth, &mut content);
    match (open_start, open_end) {
        (Some(os), Some(oe)) if rp_start.index(depth) == rp_end.index(depth) => {
            check_join(os, oe)?;
            let inner = replace_three_way(rp_from, rp_start, rp_end, rp_to, depth + 1)?;
            let closed = close(os, inner)?;
            add_node(Cow::Owned(closed), &mut content);
        }
        _ => {
            if let Some(os) = open_start {
                let inner = replace_two_way(rp_from, rp_start, depth + 1)?;
                let closed = close(os, inner)?;
                add_node(Cow::Owned(closed), &mut content);
            }
            add_range(Range::Both(rp_start, rp_end), depth, &mut content);
            if let Some(oe) = open_end {
                let inner = replace_two_way(rp_end, rp_to, depth + 1)?;
                let closed = close(oe, inner)?;
                add_node(Cow::Owned(closed), &mut content);
            }
        }
    }
    add_range(Range::Left(rp_to), depth, &mut content);
    Ok(Fragment::from(content))
}

fn replace_two_way(
    rp_from: &ResolvedPos,
    rp_to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let mut content = Vec::new();
    add_range(Range::Right(rp_from), depth, &mut content);
    if rp_from.depth() > depth {
        let r#type = joinable(rp_from, rp_to, depth + 1)?;
        let inner = replace_two_way(rp_from, rp_to, depth + 1)?;
        let child = close(r#type, inner)?;
        add_node(Cow::Owned(child), &mut content);
    }
    add_range(Range::Left(rp_to), depth, &mut content);
    Ok(Fragment::from(content))
}

fn prepare_slice_for_replace(slice: &Slice, rp_along: &ResolvedPos) -> (Node, usize, usize) {
    let extra = rp_along.depth() - slice.open_start();
    let parent = rp_along.node(extra);
    let mut node = parent.copy(|_| slice.content().clone());
    for i in (0..extra).rev() {
        let inner = node;
        node = rp_along.node(i).copy(move |_| Fragment::from(inner));
    }

    let start = slice.open_start() + extra;
    let end = node.content_size() - slice.open_end() - extra;
    (node, start, end)
}

#[cfg(test)]
mod tests {
    use super::ReplaceError;
    use crate::tests::helper::{blockquote, doc, h1, li, p, ul};
    use crate::{Node, Slice};
    use std::ops::Range;

    fn rpl(
        (doc, range): (Node, Range<usize>),
        insert: Option<(Node, Range<usize>)>,
        expected: Node,
    ) {
        let slice = insert
            .map(|(node, range)| node.slice(range, false).unwrap())
            .unwrap_or_default();

        assert_eq!(doc.replace(range, &slice), Ok(expected));
    }

    #[test]
    fn join_on_delete() {
        let t1 = doc((p("one"), p("two")));
        let e1 = doc(p("onwo"));
        rpl((t1, 3..7), None, e1);
    }

    #[test]
    fn merges_matching_blocks() {
        let t2 = doc((p("one"), p("two")));
        let i2 = doc((p("xxxx"), p("yyyy")));

        let f2 = crate::Fragment::from(vec![p("xx"), p("yy")]);
        assert_eq!(i2.slice(3..9, false), Ok(Slice::new(f2, 1, 1)));

        let e2 = doc((p("onxx"), p("yywo")));
        rpl((t2, 3..7), Some((i2, 3..9)), e2);
    }

    #[test]
    fn merges_when_adding_text() {
        let (t3, r3) = (doc((p("one"), p("two"))), 3..7);
        let (i3, s3) = (doc(p("H")), 1..2);
        let e3 = doc(p("onHwo"));

        rpl((t3, r3), Some((i3, s3)), e3);
    }

    #[test]
    fn merges_across_two_depths() {
        let t = doc(blockquote((p("one"), p("two"))));
        let i = doc(p("H"));
        let e = doc(blockquote(p("onHwo")));

        rpl((t, 4..8), Some((i, 1..2)), e);
    }

    #[test]
    fn can_insert_text() {
        let t4 = doc(vec![p("before"), p("one"), p("after")]);
        let r4 = 11..11;

        let i4 = doc(p("H"));
        let s4 = 1..2;

        let e4 = doc(vec![p("before"), p("onHe"), p("after")]);
        rpl((t4, r4), Some((i4, s4)), e4);
    }

    #[test]
    fn doesnt_merge_non_matching_blocks() {
        let t5 = doc((p("one"), p("two")));
        let r5 = 3..7;

        let i5 = doc(h1("H"));
        let s5 = 1..2;

        let e5 = doc(p("onHwo"));
        rpl((t5, r5), Some((i5, s5)), e5);
    }

    #[test]
    fn can_merge_a_nested_node() {
        let t6 = doc(blockquote(blockquote((p("one"), p("two")))));
        let i6 = doc(p("H"));
        let e6 = doc(blockquote(blockquote(p("onHwo"))));

        rpl((t6, 5..9), Some((i6, 1..2)), e6);
    }

    #[test]
    fn can_replace_within_a_block() {
        let t = doc(blockquote(p("abcd")));
        let i = doc(p("xyz"));
        let e = doc(blockquote(p("ayd")));

        rpl((t, 3..5), Some((i, 2..3)), e);
    }

    #[test]
    fn can_insert_a_lopsided_slice() {
        let t = doc(blockquote(blockquote(vec![p("one"), p("two"), p("three")])));
        let i = doc(blockquote(vec![p("aaaa"), p("bb"), p("cc"), p("dd")]));
        let e = doc(blockquote(blockquote(vec![
            p("onaa"),
            p("bb"),
            p("cc"),
            p("three"),
        ])));

        rpl((t, 5..12), Some((i, 4..15)), e);
    }

    #[test]
    fn can_insert_a_deep_lopsided_slice() {
        let t = doc(blockquote(vec![
            blockquote(vec![p("one"), p("two"), p("three")]),
            p("x"),
        ]));
        let i = doc(vec![blockquote(vec![p("aaaa"), p("bb"), p("cc")]), p("dd")]);
        let e = doc(blockquote(vec![
            blockquote(vec![p("onaa"), p("bb"), p("cc")]),
            p("x"),
        ]));

        rpl((t, 5..20), Some((i, 4..16)), e);
    }

    #[test]
    fn can_merge_multiple_levels() {
        let t = doc(vec![
            blockquote(blockquote(p("hello"))),
            blockquote(blockquote(p("a"))),
        ]);
        let e = doc(blockquote(blockquote(p("hella"))));

        rpl((t, 7..14), None, e);
    }

    #[test]
    fn can_merge_multiple_levels_while_inserting() {
        let t = doc(vec![
            blockquote(blockquote(p("hello"))),
            blockquote(blockquote(p("a"))),
        ]);
        let i = doc(p("i"));
        let e = doc(blockquote(blockquote(p("hellia"))));

        rpl((t, 7..14), Some((i, 1..2)), e);
    }

    #[test]
    fn can_insert_a_split() {
        let t = doc(p("foobar"));
        let i = doc(vec![p("x"), p("y")]);
        let e = doc(vec![p("foox"), p("ybar")]);

        rpl((t, 4..4), Some((i, 1..5)), e);
    }

    #[test]
    fn can_insert_a_deep_split() {
        let t = doc(blockquote(p("fooxbar")));
        let i = doc(vec![blockquote(p("x")), blockquote(p("y"))]);
        let e = doc(vec![blockquote(p("foox")), blockquote(p("ybar"))]);

        rpl((t, 5..6), Some((i, 2..8)), e);
    }

    #[test]
    fn can_add_a_split_one_level_up() {
        let t = doc(blockquote(vec![p("foou"), p("vbar")]));
        let i = doc(vec![blockquote(p("x")), blockquote(p("y"))]);
        let e = doc(vec![blockquote(p("foox")), blockquote(p("ybar"))]);

        rpl((t, 5..9), Some((i, 2..8)), e);
    }

    #[test]
    fn keeps_the_node_type_of_the_left_node() {
        let t = doc(h1("foobar"));
        let i = doc(p("foobaz"));
        let e = doc(h1("foobaz"));

        rpl((t, 4..8), Some((i, 4..8)), e);
    }

    #[test]
    fn keeps_the_node_type_even_when_empty() {
        let t = doc(h1("bar"));
        let i = doc(p("foobaz"));
        let e = doc(h1("baz"));

        rpl((t, 1..5), Some((i, 4..8)), e);
    }

    #[test]
    fn replacing_nothing_with_nothing_is_identity() {
        let t = doc((p("ab"), blockquote((p("cd"), ul(li(p("ef")))))));
        for pos in 0..=t.content_size() {
            assert_eq!(
                t.replace(pos..pos, &Slice::default()),
                Ok(t.clone()),
                "at {}",
                pos
            );
        }
    }

    #[test]
    fn completes_a_truncated_list_item() {
        // Deleting the whole paragraph of a list item leaves a sequence that
        // stops short of an accepting state; the required paragraph is
        // synthesized when the item is closed.
        let t = doc(ul(li(p("ab"))));
        let e = doc(ul(li(p(""))));
        rpl((t, 2..6), None, e);
    }

    fn bad(
        (doc, range): (Node, Range<usize>),
        insert: Option<(Node, Range<usize>)>,
        pattern: ReplaceError,
    ) {
        let slice = insert
            .map(|(node, range)| node.slice(range, false).unwrap())
            .unwrap_or_default();
        assert_eq!(doc.replace(range, &slice), Err(pattern));
    }

    #[test]
    fn doesnt_allow_the_left_side_to_be_too_deep() {
        let t = doc(p(""));
        let i = doc(blockquote(p("")));
        bad((t, 1..1), Some((i, 2..4)), ReplaceError::InsertTooDeep);
    }

    #[test]
    fn doesnt_allow_a_depth_mismatch() {
        let t = doc(p(""));
        let i = doc(p(""));
        bad(
            (t, 1..1),
            Some((i, 0..1)),
            ReplaceError::InconsistentOpenDepths {
                from_depth: 1,
                open_start: 0,
                to_depth: 1,
                open_end: 1,
            },
        );
    }

    #[test]
    fn rejects_a_bad_fit() {
        let t = doc(());
        let i = doc(p("foo"));
        let e = ReplaceError::InvalidContent(
            crate::tests::basic::schema().node_type("doc").unwrap(),
        );

        bad((t, 0..0), Some((i, 1..4)), e);
    }

    #[test]
    fn rejects_unjoinable_content() {
        let t = doc(ul(li(p("a"))));
        let i = doc(p("foo"));
        let e = ReplaceError::CannotJoin(
            crate::tests::basic::schema().node_type("paragraph").unwrap(),
            crate::tests::basic::schema()
                .node_type("bullet_list")
                .unwrap(),
        );

        bad((t, 6..7), Some((i, 4..5)), e);
    }

    #[test]
    fn rejects_an_unjoinable_delete() {
        let t = doc(vec![blockquote(p("a")), ul(li(p("b")))]);
        let e = ReplaceError::CannotJoin(
            crate::tests::basic::schema()
                .node_type("bullet_list")
                .unwrap(),
            crate::tests::basic::schema()
                .node_type("blockquote")
                .unwrap(),
        );

        bad((t, 4..6), None, e);
    }

    #[test]
    fn check_content_validity() {
        let t = doc(blockquote(p("hi")));
        let i = doc(
            crate::tests::basic::schema()
                .node(
                    "blockquote",
                    None,
                    crate::tests::basic::schema().text("hi"),
                    None,
                )
                .unwrap(),
        );
        let e = ReplaceError::InvalidContent(
            crate::tests::basic::schema()
                .node_type("blockquote")
                .unwrap(),
        );

        bad((t, 1..6), Some((i, 2..4)), e);
    }
}
