use super::basic::{attrs, schema};
use super::helper::*;
use crate::{CreateError, Fragment, FromJsonError, Node, Slice};
use serde_json::json;

fn full_doc() -> Node {
    doc((
        h2(("Heading ", code("mono"))),
        p((
            "hello ",
            em("world"),
            a("link", "http://example.com"),
            img("x.png"),
            br(),
        )),
        blockquote((p("quoted"), hr())),
        (
            ul((li(p("a")), li((p("b"), ul(li(p("c"))))))),
            schema()
                .node(
                    "ordered_list",
                    Some(&attrs(json!({ "order": 3 }))),
                    li(p("numbered")).into_frag(),
                    None,
                )
                .unwrap(),
            code_block("fn main() {}"),
        ),
    ))
}

#[test]
fn json_round_trip() {
    let document = full_doc();
    let json = document.to_json();
    let restored = Node::from_json(schema(), &json).unwrap();
    assert_eq!(restored, document);
}

#[test]
fn json_shape() {
    assert_eq!(
        p((em("hi"), " there")).to_json(),
        json!({
            "type": "paragraph",
            "content": [
                {"type": "text", "text": "hi", "marks": [{"type": "em"}]},
                {"type": "text", "text": " there"},
            ],
        })
    );
    assert_eq!(
        img("x.png").to_json(),
        json!({
            "type": "image",
            "attrs": {"src": "x.png", "alt": null, "title": null},
        })
    );
    assert_eq!(hr().to_json(), json!({"type": "horizontal_rule"}));
}

#[test]
fn mark_attrs_survive() {
    let linked = a("click", "http://x");
    let json = linked.to_json();
    assert_eq!(
        json["marks"][0],
        json!({"type": "link", "attrs": {"href": "http://x", "title": null}})
    );
    assert_eq!(Node::from_json(schema(), &json).unwrap(), linked);
}

#[test]
fn rejects_unknown_node_types() {
    let err = Node::from_json(schema(), &json!({"type": "whatsit"})).unwrap_err();
    assert_eq!(
        err,
        FromJsonError::Create(CreateError::UnknownNodeType("whatsit".to_owned()))
    );
}

#[test]
fn rejects_missing_required_attrs() {
    let err = Node::from_json(schema(), &json!({"type": "image"})).unwrap_err();
    assert!(matches!(err, FromJsonError::Create(CreateError::Attr(_))));
}

#[test]
fn rejects_malformed_input() {
    assert_eq!(
        Node::from_json(schema(), &json!("string")).unwrap_err(),
        FromJsonError::InvalidNode
    );
    assert_eq!(
        Node::from_json(schema(), &json!({"type": "text"})).unwrap_err(),
        FromJsonError::InvalidText
    );
    assert_eq!(
        Node::from_json(schema(), &json!({"type": "text", "text": ""})).unwrap_err(),
        FromJsonError::InvalidText
    );
    assert_eq!(
        Node::from_json(
            schema(),
            &json!({"type": "paragraph", "marks": {"type": "em"}})
        )
        .unwrap_err(),
        FromJsonError::InvalidMark
    );
}

#[test]
fn slice_round_trip() {
    let document = doc((p("one"), p("two")));
    let slice = document.slice(3..7, false).unwrap();
    assert_eq!(slice.open_start(), 1);
    assert_eq!(slice.open_end(), 1);
    let restored = Slice::from_json(schema(), &slice.to_json()).unwrap();
    assert_eq!(restored, slice);

    let empty = Slice::default();
    assert_eq!(Slice::from_json(schema(), &empty.to_json()).unwrap(), empty);
}

#[test]
fn fragment_round_trip() {
    let fragment = Fragment::from(vec![p("a"), hr(), p("b")]);
    let restored = Fragment::from_json(schema(), &fragment.to_json()).unwrap();
    assert_eq!(restored, fragment);
}

#[test]
fn check_validates_documents() {
    assert!(full_doc().check().is_ok());

    // A blockquote with inline content is invalid
    let broken = schema()
        .node("blockquote", None, text("loose"), None)
        .unwrap();
    assert!(broken.check().is_err());
}

#[test]
fn display_renders_readably() {
    assert_eq!(
        doc(p(("ab", em("cd")))).to_string(),
        "doc(paragraph(\"ab\", em(\"cd\")))"
    );
    assert_eq!(doc(hr()).to_string(), "doc(horizontal_rule)");
}
