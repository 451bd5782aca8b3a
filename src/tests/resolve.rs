use super::helper::*;
use crate::Node;
use std::borrow::Cow;

#[derive(Debug, Copy, Clone, PartialEq)]
struct Sol<'a> {
    node: &'a Node,
    start: usize,
    end: usize,
}

fn sol(node: &Node, start: usize, end: usize) -> Sol {
    Sol { node, start, end }
}

#[derive(Copy, Clone, Debug)]
enum Exp<'a> {
    Node(&'a Node),
    Str(&'static str),
    Null,
}

fn check(actual: &Option<Cow<Node>>, expected: Exp) -> bool {
    match (actual, expected) {
        (Some(node), Exp::Node(exp)) => node.as_ref() == exp,
        (Some(node), Exp::Str(text)) => node.text_content() == text,
        (None, Exp::Null) => true,
        _ => false,
    }
}

#[test]
fn resolves_every_position() {
    let test_doc = doc((p("ab"), blockquote(p((em("cd"), "ef")))));
    let _doc = sol(&test_doc, 0, 12);
    let _p1 = sol(test_doc.child(0), 1, 3);
    let _blk = sol(test_doc.child(1), 5, 11);
    let _p2 = sol(_blk.node.child(0), 6, 10);

    let expected = [
        (&[_doc][..], 0, Exp::Null, Exp::Node(_p1.node)),
        (&[_doc, _p1][..], 0, Exp::Null, Exp::Str("ab")),
        (&[_doc, _p1][..], 1, Exp::Str("a"), Exp::Str("b")),
        (&[_doc, _p1][..], 2, Exp::Str("ab"), Exp::Null),
        (&[_doc][..], 4, Exp::Node(_p1.node), Exp::Node(_blk.node)),
        (&[_doc, _blk][..], 0, Exp::Null, Exp::Node(_p2.node)),
        (&[_doc, _blk, _p2][..], 0, Exp::Null, Exp::Str("cd")),
        (&[_doc, _blk, _p2][..], 1, Exp::Str("c"), Exp::Str("d")),
        (&[_doc, _blk, _p2][..], 2, Exp::Str("cd"), Exp::Str("ef")),
        (&[_doc, _blk, _p2][..], 3, Exp::Str("e"), Exp::Str("f")),
        (&[_doc, _blk, _p2][..], 4, Exp::Str("ef"), Exp::Null),
        (&[_doc, _blk][..], 6, Exp::Node(_p2.node), Exp::Null),
        (&[_doc][..], 12, Exp::Node(_blk.node), Exp::Null),
    ];

    for (pos, (path, parent_offset, before, after)) in expected.iter().enumerate() {
        let resolved = test_doc.resolve(pos).unwrap();
        assert_eq!(resolved.depth(), path.len() - 1, "depth at {}", pos);

        for (i, exp) in path.iter().enumerate() {
            assert_eq!(
                sol(resolved.node(i), resolved.start(i), resolved.end(i)),
                *exp,
                "ancestor {} at {}",
                i,
                pos
            );
            if i > 0 {
                assert_eq!(resolved.before(i), Some(exp.start - 1));
                assert_eq!(resolved.after(i), Some(exp.end + 1));
            }
        }
        assert_eq!(resolved.parent_offset(), *parent_offset, "offset at {}", pos);
        assert!(check(&resolved.node_before(), *before), "before at {}", pos);
        assert!(check(&resolved.node_after(), *after), "after at {}", pos);
    }
}

#[test]
fn resolves_the_deep_position_with_context() {
    // Position 8 sits between "cd" and "ef" in the inner paragraph
    let test_doc = doc((p("ab"), blockquote(p((em("cd"), "ef")))));
    let resolved = test_doc.resolve(8).unwrap();
    assert_eq!(resolved.depth(), 2);
    assert_eq!(resolved.parent(), test_doc.child(1).child(0));
    assert_eq!(resolved.parent_offset(), 2);
    assert_eq!(resolved.node_before().unwrap().text_content(), "cd");
    assert_eq!(resolved.node_after().unwrap().text_content(), "ef");
}

#[test]
fn start_offsets_recompute_the_position() {
    let test_doc = doc((p("ab"), blockquote((p((em("cd"), "ef")), ul(li(p("gh")))))));
    for pos in 0..=test_doc.content_size() {
        let resolved = test_doc.resolve(pos).unwrap();
        // The parent's start plus the parent offset is the position itself
        assert_eq!(
            resolved.start(resolved.depth()) + resolved.parent_offset(),
            pos
        );
        assert_eq!(resolved.pos(), pos);
    }
}

#[test]
fn rejects_out_of_range_positions() {
    let test_doc = doc(p("ab"));
    assert!(test_doc.resolve(test_doc.content_size()).is_ok());
    assert!(test_doc.resolve(test_doc.content_size() + 1).is_err());
}

#[test]
fn index_after_and_pos_at_index() {
    let test_doc = doc((p("ab"), p("cd")));
    let resolved = test_doc.resolve(4).unwrap();
    assert_eq!(resolved.index(0), 1);
    assert_eq!(resolved.index_after(0), 1);
    assert_eq!(resolved.pos_at_index(1, 0), 4);
    assert_eq!(resolved.pos_at_index(2, 0), 8);
}

#[test]
fn shared_depth_finds_the_common_ancestor() {
    let test_doc = doc((p("ab"), blockquote(p("cd"))));
    let resolved = test_doc.resolve(6).unwrap();
    assert_eq!(resolved.shared_depth(7), 2);
    assert_eq!(resolved.shared_depth(5), 1);
    assert_eq!(resolved.shared_depth(2), 0);
}

#[test]
fn block_range_expands_to_siblings() {
    let test_doc = doc(blockquote((p("ab"), p("cd"))));
    let from = test_doc.resolve(3).unwrap();
    let to = test_doc.resolve(7).unwrap();
    let range = from.block_range(&to, None).unwrap();
    assert_eq!(range.depth(), 1);
    assert_eq!(range.start(), 1);
    assert_eq!(range.end(), 9);
    assert_eq!(range.start_index(), 0);
    assert_eq!(range.end_index(), 2);
    assert_eq!(range.parent(), test_doc.child(0));
}

#[test]
fn node_sizes_add_up() {
    fn check_node(node: &Node) {
        let child_sum: usize = node
            .content()
            .children()
            .iter()
            .map(Node::node_size)
            .sum();
        assert_eq!(node.content_size(), child_sum);
        if node.is_text() {
            assert_eq!(node.node_size(), node.as_text().unwrap().len_utf16());
        } else if node.is_leaf() {
            assert_eq!(node.node_size(), 1);
        } else {
            assert_eq!(node.node_size(), node.content_size() + 2);
        }
        for child in node.content().children() {
            check_node(child);
        }
    }
    check_node(&doc((
        p(("ab", em("cd"), img("x.png"))),
        blockquote((p("ef"), hr())),
        ul(li((p("gh"), code_block("ij")))),
    )));
}

#[test]
fn adjacent_text_with_equal_marks_merges() {
    let fragment = crate::Fragment::from(vec![text("ab"), text("cd"), em("ef")]);
    assert_eq!(fragment.child_count(), 2);
    assert_eq!(fragment.child(0).text_content(), "abcd");

    let p_node = p((text("ab"), text("cd")));
    assert_eq!(p_node.child_count(), 1);
}
