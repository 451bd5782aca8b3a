use super::basic::schema;
use super::helper::*;
use crate::{
    DomNode, DomParser, DomSerializer, Element, MarkToDom, Node, NodeToDom, OutputSpec,
    ParseOptions, SerializeError, SerializeOptions,
};
use std::collections::HashMap;
use std::sync::Arc;

fn serialize(node: &Node) -> String {
    let serializer = DomSerializer::from_schema(schema());
    serializer
        .serialize_fragment(node.content(), &SerializeOptions::default())
        .unwrap()
        .iter()
        .map(DomNode::to_string)
        .collect()
}

fn schema_node_specs() -> HashMap<String, NodeToDom> {
    let mut nodes: HashMap<String, NodeToDom> = HashMap::new();
    for r#type in schema().node_types() {
        if let Some(to_dom) = &r#type.spec().to_dom {
            nodes.insert(r#type.name().to_owned(), to_dom.clone());
        }
    }
    nodes.insert(
        "text".to_owned(),
        Arc::new(|node: &Node| {
            OutputSpec::text(node.as_text().map(|t| t.as_str()).unwrap_or_default())
        }),
    );
    nodes
}

fn schema_mark_specs() -> HashMap<String, MarkToDom> {
    let mut marks: HashMap<String, MarkToDom> = HashMap::new();
    for r#type in schema().mark_types() {
        if let Some(to_dom) = &r#type.spec().to_dom {
            marks.insert(r#type.name().to_owned(), to_dom.clone());
        }
    }
    marks
}

#[test]
fn renders_basic_markup() {
    assert_eq!(
        serialize(&doc((p(("one", em("two"))), blockquote(p("three"))))),
        "<p>one<em>two</em></p><blockquote><p>three</p></blockquote>"
    );
    assert_eq!(
        serialize(&doc((h2("head"), hr(), code_block("x < y")))),
        "<h2>head</h2><hr><pre><code>x &lt; y</code></pre>"
    );
}

#[test]
fn spans_marks_over_adjacent_content() {
    assert_eq!(
        serialize(&doc(p((em("a"), marked("b", &["em", "strong"]), em("c"))))),
        "<p><em>a<strong>b</strong>c</em></p>"
    );
}

#[test]
fn a_missing_mark_spec_does_not_split_others() {
    // A serializer without an `em` spec drops the mark but keeps runs intact
    let mut marks = schema_mark_specs();
    marks.remove("em");
    let serializer = DomSerializer::new(schema(), schema_node_specs(), marks);

    let out: String = serializer
        .serialize_fragment(
            p(("foo", em("bar"), strong("baz"))).content(),
            &SerializeOptions::default(),
        )
        .unwrap()
        .iter()
        .map(DomNode::to_string)
        .collect();
    assert_eq!(out, "foobar<strong>baz</strong>");
}

#[test]
fn serializes_single_nodes_with_their_marks() {
    let serializer = DomSerializer::from_schema(schema());
    let rendered = serializer
        .serialize_node(&marked("x", &["em", "strong"]), &SerializeOptions::default())
        .unwrap();
    assert_eq!(rendered.to_string(), "<em><strong>x</strong></em>");
}

#[test]
fn renders_attributes() {
    assert_eq!(
        serialize(&doc(p((a("go", "http://x"), img("y.png"))))),
        "<p><a href=\"http://x\">go</a><img src=\"y.png\"></p>"
    );
    let numbered = schema()
        .node(
            "ordered_list",
            Some(&super::basic::attrs(serde_json::json!({"order": 3}))),
            li(p("x")).into_frag(),
            None,
        )
        .unwrap();
    assert_eq!(
        serialize(&doc(numbered)),
        "<ol start=\"3\"><li><p>x</p></li></ol>"
    );
}

#[test]
fn errors_on_a_missing_hole_in_a_non_leaf_spec() {
    let mut nodes = schema_node_specs();
    nodes.insert(
        "paragraph".to_owned(),
        Arc::new(|_: &Node| OutputSpec::tag("p")),
    );
    let serializer = DomSerializer::new(schema(), nodes, schema_mark_specs());
    assert_eq!(
        serializer
            .serialize_node(&p("x"), &SerializeOptions::default())
            .unwrap_err(),
        SerializeError::MissingHole("paragraph".to_owned())
    );
}

#[test]
fn errors_on_a_hole_in_a_leaf_spec() {
    let mut nodes = schema_node_specs();
    nodes.insert(
        "horizontal_rule".to_owned(),
        Arc::new(|_: &Node| OutputSpec::with_hole("hr")),
    );
    let serializer = DomSerializer::new(schema(), nodes, schema_mark_specs());
    assert_eq!(
        serializer
            .serialize_node(&hr(), &SerializeOptions::default())
            .unwrap_err(),
        SerializeError::HoleInLeaf
    );
}

#[test]
fn errors_on_a_hole_in_a_mark_spec() {
    let mut marks = schema_mark_specs();
    marks.insert(
        "em".to_owned(),
        Arc::new(|_: &crate::Mark, _: bool| OutputSpec::with_hole("em")),
    );
    let serializer = DomSerializer::new(schema(), schema_node_specs(), marks);
    assert_eq!(
        serializer
            .serialize_node(&em("x"), &SerializeOptions::default())
            .unwrap_err(),
        SerializeError::HoleInMark
    );
}

#[test]
fn on_content_replaces_the_recursive_render() {
    let serializer = DomSerializer::from_schema(schema());
    let on_content = |_: &Node, hole: &mut Element| {
        hole.append(DomNode::text("replaced"));
    };
    let options = SerializeOptions {
        on_content: Some(&on_content),
    };
    let rendered = serializer.serialize_node(&p("original"), &options).unwrap();
    assert_eq!(rendered.to_string(), "<p>replaced</p>");
}

#[test]
fn closed_documents_round_trip() {
    let document = doc((
        h2(("Head ", code("line"))),
        p((
            "hello ",
            em("world"),
            marked("both", &["em", "strong"]),
            a("link", "http://example.com"),
            img("x.png"),
            br(),
            "tail",
        )),
        blockquote((p("quoted"), hr())),
        ul((li(p("a")), li((p("b"), ul(li(p("c"))))))),
        code_block("fn main() {\n    let x = 1;\n}"),
    ));

    let serializer = DomSerializer::from_schema(schema());
    let mut wrapper = Element::new("div");
    for node in serializer
        .serialize_fragment(document.content(), &SerializeOptions::default())
        .unwrap()
    {
        wrapper.append(node);
    }
    let root = DomNode::from(wrapper);
    let reparsed = DomParser::from_schema(schema()).parse(&root, ParseOptions::default());
    assert_eq!(reparsed, document);
}
