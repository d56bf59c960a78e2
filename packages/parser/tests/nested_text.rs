//! Nested-text codec tests
//!
//! Covers depth resolution, fragment isolation and the encode/decode
//! round trip over generated trees.

use flowtree_parser::nested::DOCUMENT_HEADER;
use flowtree_parser::{Component, NestedText, Options};
use proptest::prelude::*;

fn type_ids(components: &[Component]) -> Vec<&str> {
    components.iter().map(|c| c.type_id.as_str()).collect()
}

#[test]
fn test_jump_back_up_two_levels() {
    let roots = NestedText::new()
        .decode(&["A", "  B", "  C", "    D", "A2"])
        .unwrap();

    assert_eq!(type_ids(&roots), vec!["A", "A2"]);
    let a = &roots[0];
    assert_eq!(type_ids(&a.children), vec!["B", "C"]);
    assert!(a.children[0].children.is_empty());
    assert_eq!(type_ids(&a.children[1].children), vec!["D"]);
}

#[test]
fn test_siblings_after_deep_nesting() {
    let lines = [
        "Flow -name Flow",
        "  Sequence -name outer",
        "    Sequence -name inner",
        "      Display -name d1",
        "    Display -name d2",
        "  Display -name d3",
    ];
    let roots = NestedText::new().decode(&lines).unwrap();
    let flow = &roots[0];

    assert_eq!(flow.children.len(), 2);
    assert_eq!(flow.children[0].children[1].name, "d2");
    assert_eq!(flow.children[1].name, "d3");
    assert_eq!(flow.count(), 6);
}

#[test]
fn test_clipboard_payload_with_one_bad_fragment() {
    let payload = "Sequence -name a\n  Display -name x\nDisplay -name \"unterminated\nTee -name t\n";
    let lines: Vec<&str> = payload.lines().collect();
    let results = NestedText::new().decode_fragments(&lines);

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().name, "t");
}

#[test]
fn test_strict_decode_fails_on_bad_first_line() {
    let err = NestedText::new().decode(&["\"Flow"]).unwrap_err();
    assert_eq!(err.line(), Some(1));
}

#[test]
fn test_document_round_trip_with_header() {
    let flow = Component::new("Flow", "Flow")
        .with_child(Component::new("Display", "out").with_option("title", "My output"));
    let codec = NestedText::new();
    let text = codec.encode_document(&[flow.clone()]);

    for header in DOCUMENT_HEADER {
        assert!(text.contains(header));
    }
    assert_eq!(codec.decode_str(&text).unwrap(), vec![flow]);
}

#[test]
fn test_component_serializes_to_json() {
    let component = Component::new("Display", "out").with_option("title", "x");
    let json = serde_json::to_string(&component).unwrap();
    let back: Component = serde_json::from_str(&json).unwrap();
    assert_eq!(back, component);
}

fn arb_component() -> impl Strategy<Value = Component> {
    (
        "[A-Z][A-Za-z]{0,8}",
        "[ -~]{0,10}",
        any::<bool>(),
        "[ -~\n]{0,10}",
        prop::option::of("[A-Z]{1,5}"),
        prop::collection::vec(("[a-z][a-z0-9]{0,6}", prop::option::of("[ -~]{0,8}")), 0..4),
    )
        .prop_map(|(type_id, name, skip, annotation, logging_level, options)| {
            let mut component = Component::new(type_id, name);
            component.skip = skip;
            component.annotation = annotation;
            component.logging_level = logging_level;
            component.options = options
                .into_iter()
                .filter(|(key, _)| !matches!(key.as_str(), "name" | "skip" | "annotation"))
                .collect::<Options>();
            component
        })
}

fn arb_tree() -> impl Strategy<Value = Component> {
    arb_component().prop_recursive(4, 32, 4, |inner| {
        (arb_component(), prop::collection::vec(inner, 0..4)).prop_map(|(mut parent, children)| {
            parent.children = children;
            parent
        })
    })
}

proptest! {
    #[test]
    fn test_decode_inverts_encode(trees in prop::collection::vec(arb_tree(), 1..4)) {
        let codec = NestedText::new();
        let lines = codec.encode(&trees);
        prop_assert_eq!(lines.len(), trees.iter().map(Component::count).sum::<usize>());
        prop_assert_eq!(codec.decode(&lines).unwrap(), trees);
    }

    #[test]
    fn test_fragments_match_strict_decode(trees in prop::collection::vec(arb_tree(), 1..4)) {
        let codec = NestedText::new();
        let lines = codec.encode(&trees);
        let fragments: Vec<Component> = codec
            .decode_fragments(&lines)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(fragments, trees);
    }

    #[test]
    fn test_strip_is_idempotent(tree in arb_tree()) {
        let once = tree.stripped();
        prop_assert_eq!(once.stripped(), once);
    }
}
