use super::basic::schema;
use super::helper::*;
use crate::{
    Dom, DomNode, DomParser, Element, FindPosition, Node, NodeSpec, ParseOptions, ParseRule,
    PreserveWhitespace, Schema, SchemaSpec, Slice,
};
use indexmap::IndexMap;

fn parse(root: Element) -> Node {
    let root = DomNode::from(root);
    DomParser::from_schema(schema()).parse(&root, ParseOptions::default())
}

fn div() -> Element {
    Element::new("div")
}

#[test]
fn parses_simple_structure() {
    let dom = div().child(
        Element::new("p")
            .child("hello ")
            .child(Element::new("em").child("world")),
    );
    assert_eq!(parse(dom), doc(p(("hello ", em("world")))));
}

#[test]
fn wraps_unexpected_content() {
    // A paragraph directly inside a list is re-wrapped in a list item
    let dom = div().child(Element::new("ol").child(Element::new("p").child("Oh no")));
    assert_eq!(parse(dom), doc(ol(li(p("Oh no")))));
}

#[test]
fn normalizes_whitespace() {
    let dom = div()
        .child(" ")
        .child(
            Element::new("blockquote")
                .child(" ")
                .child(
                    Element::new("p")
                        .child("woo  \n  ")
                        .child(Element::new("em").child(" hooo")),
                )
                .child(" "),
        )
        .child(" ");
    assert_eq!(parse(dom), doc(blockquote(p(("woo ", em("hooo"))))));
}

#[test]
fn preserves_whitespace_in_code_blocks() {
    let dom = div().child(
        Element::new("pre").child(Element::new("code").child("foo\n  bar")),
    );
    assert_eq!(parse(dom), doc(code_block("foo\n  bar")));
}

#[test]
fn wraps_loose_inline_content() {
    let dom = div().child("hello");
    assert_eq!(parse(dom), doc(p("hello")));
}

#[test]
fn fills_an_empty_parse() {
    assert_eq!(parse(div()), doc(p(())));
}

#[test]
fn reads_marks_from_tags_and_styles() {
    let dom = div().child(
        Element::new("p")
            .child(Element::new("i").child("a"))
            .child(Element::new("b").child("b")),
    );
    assert_eq!(parse(dom), doc(p((em("a"), strong("b")))));

    let dom = div().child(
        Element::new("p").child(
            Element::new("span")
                .attr("style", "font-style: italic")
                .child("x"),
        ),
    );
    assert_eq!(parse(dom), doc(p(em("x"))));

    let dom = div().child(
        Element::new("p").child(
            Element::new("span")
                .attr("style", "font-weight: 600")
                .child("x"),
        ),
    );
    assert_eq!(parse(dom), doc(p(strong("x"))));
}

#[test]
fn style_marks_apply_to_matched_elements() {
    let dom = div().child(
        Element::new("p")
            .attr("style", "font-style: italic")
            .child("x"),
    );
    assert_eq!(parse(dom), doc(p(em("x"))));
}

#[test]
fn a_reset_font_weight_is_not_strong() {
    let dom = div().child(
        Element::new("p").child(
            Element::new("b")
                .attr("style", "font-weight: normal")
                .child("x"),
        ),
    );
    assert_eq!(parse(dom), doc(p("x")));
}

#[test]
fn reads_rule_attributes() {
    let dom = div()
        .child(
            Element::new("p").child(
                Element::new("a")
                    .attr("href", "http://example.com")
                    .child("link"),
            ),
        )
        .child(Element::new("h2").child("head"))
        .child(Element::new("img").attr("src", "x.png"))
        .child(Element::new("ol").attr("start", "3").child(Element::new("li").child("x")));

    let parsed = parse(dom);
    let expected = doc((
        p(a("link", "http://example.com")),
        h2("head"),
        p(img("x.png")),
        schema()
            .node(
                "ordered_list",
                Some(&super::basic::attrs(serde_json::json!({"order": 3}))),
                li(p("x")).into_frag(),
                None,
            )
            .unwrap(),
    ));
    assert_eq!(parsed, expected);
}

#[test]
fn keeps_hard_breaks() {
    let dom = div().child(
        Element::new("p")
            .child("a")
            .child(Element::new("br"))
            .child("b"),
    );
    assert_eq!(parse(dom), doc(p(("a", br(), "b"))));
}

#[test]
fn drops_ignored_tags() {
    let dom = div().child(
        Element::new("p")
            .child("a")
            .child(Element::new("script").child("evil()"))
            .child("b"),
    );
    assert_eq!(parse(dom), doc(p("ab")));
}

#[test]
fn attaches_nested_lists_to_the_previous_item() {
    let dom = div().child(
        Element::new("ul")
            .child(Element::new("li").child("one"))
            .child(Element::new("ul").child(Element::new("li").child("two"))),
    );
    assert_eq!(
        parse(dom),
        doc(ul(li((p("one"), ul(li(p("two")))))))
    );
}

#[test]
fn drops_content_that_fits_nowhere() {
    // An image cannot live in a code block, and there is no wrapping route
    let dom = div().child(
        Element::new("pre").child(Element::new("img").attr("src", "x.png")),
    );
    assert_eq!(parse(dom), doc(code_block(())));
}

#[test]
fn rule_context_restricts_matches() {
    let mut rules = vec![ParseRule::tag("p")
        .context("blockquote/")
        .node("heading")
        .priority(60)];
    rules.extend(DomParser::schema_rules(schema()));
    let parser = DomParser::new(schema(), rules);

    let dom = DomNode::from(
        div()
            .child(Element::new("blockquote").child(Element::new("p").child("x")))
            .child(Element::new("p").child("y")),
    );
    assert_eq!(
        parser.parse(&dom, ParseOptions::default()),
        doc((blockquote(h1("x")), p("y")))
    );
}

#[test]
fn parses_slices_open_at_both_sides() {
    let root = DomNode::from(div().child(Element::new("p").child("hi")));
    let slice = DomParser::from_schema(schema()).parse_slice(&root, ParseOptions::default());
    assert_eq!(
        slice,
        Slice::new(crate::Fragment::from(p("hi")), 1, 1)
    );
}

#[test]
fn respects_the_whitespace_option() {
    let root = DomNode::from(div().child(Element::new("p").child("a\n b")));
    let options = ParseOptions {
        preserve_whitespace: Some(PreserveWhitespace::Full),
        ..ParseOptions::default()
    };
    assert_eq!(
        DomParser::from_schema(schema()).parse(&root, options),
        doc(p("a\n b"))
    );
}

#[test]
fn finds_positions_in_text() {
    let paragraph = Element::new("p").child("hello");
    let root = DomNode::from(div().child(paragraph));
    let text_node = root.child(0).child(0);
    let options = ParseOptions {
        find_positions: vec![
            FindPosition {
                node: text_node,
                offset: 3,
            },
            FindPosition {
                node: text_node,
                offset: 0,
            },
        ],
        ..ParseOptions::default()
    };
    let (parsed, positions) =
        DomParser::from_schema(schema()).parse_positions(&root, options);
    assert_eq!(parsed, doc(p("hello")));
    assert_eq!(positions, vec![Some(4), Some(1)]);
}

#[test]
fn context_guides_the_synthesized_textblock() {
    // A schema where notes start with captions, which are textblocks but not
    // the first ones the schema declares
    let mut nodes = IndexMap::new();
    nodes.insert(
        "doc".to_owned(),
        NodeSpec {
            content: Some("block+".to_owned()),
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
        "note".to_owned(),
        NodeSpec {
            content: Some("caption block*".to_owned()),
            group: Some("block".to_owned()),
            ..NodeSpec::default()
        },
    );
    nodes.insert(
        "caption".to_owned(),
        NodeSpec {
            content: Some("inline*".to_owned()),
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
    let schema = Schema::new(SchemaSpec {
        nodes,
        marks: IndexMap::new(),
        top_node: None,
    })
    .unwrap();
    let parser = DomParser::new(&schema, Vec::new());
    let root = DomNode::from(div().child(Element::new("div").child("hello")));

    // Inside a note, loose inline content becomes a caption
    let options = ParseOptions {
        context: vec!["note".to_owned()],
        ..ParseOptions::default()
    };
    let slice = parser.parse_slice(&root, options);
    assert_eq!(
        slice.content().first_child().unwrap().r#type().name(),
        "caption"
    );

    // Without context, the first textblock the schema declares wins
    let slice = parser.parse_slice(&root, ParseOptions::default());
    assert_eq!(
        slice.content().first_child().unwrap().r#type().name(),
        "paragraph"
    );
}

#[test]
fn parses_into_a_given_top_node() {
    let root = DomNode::from(div().child(Element::new("li").child("x")));
    let options = ParseOptions {
        top_node: Some(ul(())),
        ..ParseOptions::default()
    };
    let parsed = DomParser::from_schema(schema()).parse(&root, options);
    assert_eq!(parsed, ul(li(p("x"))));
}
