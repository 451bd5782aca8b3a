use super::basic::schema;
use super::helper::*;
use crate::{
    AttributeSpec, ContentError, Fragment, Node, NodeSpec, Schema, SchemaError, SchemaSpec,
};
use indexmap::IndexMap;

/// A minimal schema whose doc type uses the given content expression.
fn doc_schema(expr: &str) -> Result<Schema, SchemaError> {
    let mut nodes = IndexMap::new();
    nodes.insert(
        "doc".to_owned(),
        NodeSpec {
            content: Some(expr.to_owned()),
            ..NodeSpec::default()
        },
    );
    nodes.insert(
        "paragraph".to_owned(),
        NodeSpec {
            content: Some("inline*".to_owned()),
            group: Some("block".to_owned()),
            ..NodeSpec::default()
        },
    );
    nodes.insert(
        "horizontal_rule".to_owned(),
        NodeSpec {
            group: Some("block".to_owned()),
            ..NodeSpec::default()
        },
    );
    nodes.insert(
        "text".to_owned(),
        NodeSpec {
            group: Some("inline".to_owned()),
            ..NodeSpec::default()
        },
    );
    let mut image_attrs = IndexMap::new();
    image_attrs.insert("src".to_owned(), AttributeSpec::required());
    nodes.insert(
        "image".to_owned(),
        NodeSpec {
            inline: true,
            group: Some("inline".to_owned()),
            attrs: image_attrs,
            ..NodeSpec::default()
        },
    );
    Schema::new(SchemaSpec {
        nodes,
        marks: IndexMap::new(),
        top_node: None,
    })
}

fn node(schema: &Schema, name: &str) -> Node {
    schema
        .node(name, None, Fragment::default(), None)
        .unwrap()
}

#[test]
fn matches_a_simple_sequence() {
    let doc_type = schema().node_type("doc").unwrap();
    let start = doc_type.content_match();
    assert!(!start.valid_end());

    let matched = start
        .match_fragment(&Fragment::from(vec![p("a"), blockquote(p("b"))]))
        .unwrap();
    assert!(matched.valid_end());

    assert!(start.match_fragment(&Fragment::from(text("loose"))).is_none());
}

#[test]
fn fills_missing_required_nodes() {
    let schema = doc_schema("paragraph horizontal_rule paragraph").unwrap();
    let paragraph = node(&schema, "paragraph");
    let rule = node(&schema, "horizontal_rule");

    let matched = schema
        .top_node_type()
        .content_match()
        .match_fragment(&Fragment::from(paragraph.clone()))
        .unwrap();
    let fill = matched
        .fill_before(&Fragment::from(paragraph), true, 0)
        .unwrap();
    assert_eq!(fill, Fragment::from(rule));
}

#[test]
fn fills_an_empty_required_slot() {
    let start = schema().node_type("doc").unwrap().content_match();
    let fill = start.fill_before(&Fragment::default(), true, 0).unwrap();
    assert_eq!(fill, Fragment::from(p(())));
}

#[test]
fn returns_no_fill_when_impossible() {
    let start = schema().node_type("paragraph").unwrap().content_match();
    // Inline content can not absorb a block node
    assert!(start
        .fill_before(&Fragment::from(p("x")), true, 0)
        .is_none());
}

#[test]
fn finds_a_wrapping_route() {
    let start = schema().node_type("doc").unwrap().content_match();
    let list_item = schema().node_type("list_item").unwrap();
    let wrap = start.find_wrapping(&list_item).unwrap();
    assert_eq!(wrap, vec![schema().node_type("ordered_list").unwrap()]);

    // A node that fits directly needs no wrappers
    let paragraph = schema().node_type("paragraph").unwrap();
    assert_eq!(start.find_wrapping(&paragraph), Some(vec![]));

    // No route from inline content to a block node
    let inline_start = paragraph.content_match();
    assert_eq!(inline_start.find_wrapping(&paragraph), None);
}

#[test]
fn wrapping_results_are_cached() {
    let start = schema().node_type("doc").unwrap().content_match();
    let list_item = schema().node_type("list_item").unwrap();
    assert_eq!(start.find_wrapping(&list_item), start.find_wrapping(&list_item));
}

#[test]
fn exposes_a_default_type() {
    let start = schema().node_type("doc").unwrap().content_match();
    assert_eq!(
        start.default_type(),
        Some(schema().node_type("paragraph").unwrap())
    );
}

#[test]
fn compatible_requires_a_shared_type() {
    let paragraph = schema().node_type("paragraph").unwrap();
    let heading = schema().node_type("heading").unwrap();
    let doc_type = schema().node_type("doc").unwrap();
    assert!(paragraph.compatible_content(&heading));
    assert!(!paragraph.compatible_content(&doc_type));
}

#[test]
fn edges_follow_declaration_order() {
    let start = schema().node_type("doc").unwrap().content_match();
    assert_eq!(start.edge_count(), 7);
    let (first, _) = start.edge(0).unwrap();
    assert_eq!(first.name(), "paragraph");
}

#[test]
fn counted_quantifiers() {
    let schema = doc_schema("paragraph{2,3}").unwrap();
    let top = schema.top_node_type();
    let paragraphs = |n: usize| {
        Fragment::from((0..n).map(|_| node(&schema, "paragraph")).collect::<Vec<_>>())
    };
    assert!(!top.valid_content(&paragraphs(1)));
    assert!(top.valid_content(&paragraphs(2)));
    assert!(top.valid_content(&paragraphs(3)));
    assert!(!top.valid_content(&paragraphs(4)));
}

#[test]
fn open_ended_count() {
    let schema = doc_schema("paragraph{2,}").unwrap();
    let top = schema.top_node_type();
    let paragraphs = |n: usize| {
        Fragment::from((0..n).map(|_| node(&schema, "paragraph")).collect::<Vec<_>>())
    };
    assert!(!top.valid_content(&paragraphs(1)));
    assert!(top.valid_content(&paragraphs(2)));
    assert!(top.valid_content(&paragraphs(7)));
}

#[test]
fn rejects_unknown_names() {
    assert!(matches!(
        doc_schema("bogus+"),
        Err(SchemaError::Content {
            source: ContentError::UnknownType { .. },
            ..
        })
    ));
}

#[test]
fn rejects_zero_counts() {
    assert!(matches!(
        doc_schema("paragraph{0}"),
        Err(SchemaError::Content {
            source: ContentError::ZeroQuantifier { .. },
            ..
        })
    ));
    assert!(matches!(
        doc_schema("paragraph{3,2}"),
        Err(SchemaError::Content {
            source: ContentError::ZeroQuantifier { .. },
            ..
        })
    ));
}

#[test]
fn rejects_overflowing_counts() {
    assert!(matches!(
        doc_schema("paragraph{99999999999999999999}"),
        Err(SchemaError::Content {
            source: ContentError::UnexpectedToken { .. },
            ..
        })
    ));
    assert!(matches!(
        doc_schema("paragraph{1,99999999999999999999}"),
        Err(SchemaError::Content {
            source: ContentError::UnexpectedToken { .. },
            ..
        })
    ));
}

#[test]
fn rejects_ambiguous_adjacent_terms() {
    assert!(matches!(
        doc_schema("paragraph? paragraph"),
        Err(SchemaError::Content {
            source: ContentError::Ambiguous { .. },
            ..
        })
    ));
    assert!(matches!(
        doc_schema("block* paragraph"),
        Err(SchemaError::Content {
            source: ContentError::Ambiguous { .. },
            ..
        })
    ));
    // Disjoint first sets stay legal
    assert!(doc_schema("horizontal_rule? paragraph+").is_ok());
}

#[test]
fn rejects_mixed_inline_and_block() {
    assert!(matches!(
        doc_schema("paragraph text*"),
        Err(SchemaError::Content {
            source: ContentError::MixedContent { .. },
            ..
        })
    ));
}

#[test]
fn rejects_required_non_generatable_positions() {
    // `image` has a required attribute, so it can never be synthesized
    assert!(matches!(
        doc_schema("image+"),
        Err(SchemaError::Content {
            source: ContentError::DeadEnd { .. },
            ..
        })
    ));
    // In an optional position it is fine
    assert!(doc_schema("image*").is_ok());
}

#[test]
fn rejects_malformed_expressions() {
    assert!(matches!(
        doc_schema("(paragraph"),
        Err(SchemaError::Content {
            source: ContentError::UnexpectedEnd { .. },
            ..
        })
    ));
    assert!(matches!(
        doc_schema("paragraph)"),
        Err(SchemaError::Content {
            source: ContentError::UnexpectedToken { .. },
            ..
        })
    ));
}
