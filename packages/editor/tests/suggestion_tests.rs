//! Rule-based suggestions against real trees

use flowtree_editor::{
    InsertPosition, Lookup, NodeId, Registry, SuggestionContext, SuggestionEngine, SuggestionScope, Tree,
};
use flowtree_parser::{serialize_line, Component};

fn builtin() -> (Registry, SuggestionEngine, SuggestionEngine) {
    let registry = Registry::builtin().unwrap();
    let actor = SuggestionEngine::builtin(SuggestionScope::Actor, &registry);
    let external = SuggestionEngine::builtin(SuggestionScope::External, &registry);
    (registry, actor, external)
}

fn tree(registry: &Registry, root: Component) -> Tree {
    Tree::from_component(registry, &root).unwrap()
}

fn node(tree: &Tree, full_name: &str) -> NodeId {
    tree.locate(full_name, Lookup::Direct).unwrap()
}

fn lines(components: &[Component]) -> Vec<String> {
    components.iter().map(serialize_line).collect()
}

fn insert(
    engine: &SuggestionEngine,
    registry: &Registry,
    tree: &Tree,
    target: &str,
    position: InsertPosition,
) -> Vec<String> {
    let context = SuggestionContext::for_insert(tree, registry, node(tree, target), position).unwrap();
    lines(&engine.suggest(registry, &context))
}

#[test]
fn test_builtin_rules_all_load() {
    let (_, actor, external) = builtin();
    assert!(actor.rejected().is_empty());
    assert_eq!(actor.rules().len(), 11);
    assert_eq!(actor.defaults(), &["PassThrough".to_string()]);
    assert!(external.rejected().is_empty());
    assert_eq!(external.rules().len(), 4);
}

#[test]
fn test_empty_flow_suggests_openers_in_rule_order() {
    let (registry, actor, _) = builtin();
    let tree = tree(&registry, Component::new("Flow", "Flow"));

    let suggested = insert(&actor, &registry, &tree, "Flow", InsertPosition::Beneath);

    assert_eq!(
        suggested,
        vec![
            "CallableActors -name CallableActors",
            "Stopwatch -name Stopwatch",
            "Start -name Start",
            "Display -name Display",
        ]
    );
}

#[test]
fn test_after_source_at_end_suggests_display() {
    let (registry, actor, _) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow").with_child(Component::new("Start", "start")),
    );

    let suggested = insert(&actor, &registry, &tree, "Flow.start", InsertPosition::After);
    assert_eq!(suggested, vec!["Display -name Display"]);
}

#[test]
fn test_between_file_source_and_sink() {
    let (registry, actor, _) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow")
            .with_child(Component::new("FileSupplier", "files"))
            .with_child(Component::new("Display", "show")),
    );

    let context =
        SuggestionContext::for_insert(&tree, &registry, node(&tree, "Flow.files"), InsertPosition::After).unwrap();
    let suggested = actor.suggest(&registry, &context);

    let types: Vec<&str> = suggested.iter().map(|c| c.type_id.as_str()).collect();
    assert_eq!(types, vec!["TextFileReader", "Convert"]);
    assert_eq!(suggested[1].name, "to-show");
    assert_eq!(suggested[1].options.get("conversion"), Some("AnyToString"));
}

#[test]
fn test_here_before_source_excludes_sources_and_sinks() {
    let (registry, actor, _) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("Display", "show")),
    );

    let suggested = insert(&actor, &registry, &tree, "Flow.start", InsertPosition::Here);
    assert_eq!(
        suggested,
        vec!["CallableActors -name CallableActors", "Stopwatch -name Stopwatch"]
    );
}

#[test]
fn test_restrictions_filter_candidates() {
    let (registry, actor, _) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow").with_child(Component::new("Branch", "branch")),
    );

    let suggested = insert(&actor, &registry, &tree, "Flow.branch", InsertPosition::Beneath);
    assert_eq!(suggested, vec!["Sequence -name Sequence"]);
}

#[test]
fn test_template_uses_parent_name() {
    let (registry, actor, _) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("Tee", "copy")),
    );

    let suggested = insert(&actor, &registry, &tree, "Flow.copy", InsertPosition::Beneath);
    assert_eq!(suggested, vec!["Display -name Display", "Display -name copy-display"]);
}

#[test]
fn test_duplicates_are_removed() {
    let registry = Registry::builtin().unwrap();
    let engine = SuggestionEngine::from_rules(
        SuggestionScope::Actor,
        &registry,
        ["IF TRUE THEN Display", "IF ISFIRST THEN Display", "IF TRUE THEN Null"],
        Vec::new(),
    );
    let tree = tree(&registry, Component::new("Flow", "Flow"));

    let suggested = insert(&engine, &registry, &tree, "Flow", InsertPosition::Beneath);
    assert_eq!(suggested, vec!["Display -name Display", "Null -name Null"]);
}

#[test]
fn test_failing_rule_is_skipped_and_defaults_apply() {
    let registry = Registry::builtin().unwrap();
    let engine = SuggestionEngine::from_rules(
        SuggestionScope::Actor,
        &registry,
        [r#"IF TRUE THEN "Display -name ${PRECEDING.NAME}""#],
        vec!["Null".to_string()],
    );
    assert_eq!(engine.rules().len(), 1);
    let tree = tree(&registry, Component::new("Flow", "Flow"));

    let suggested = insert(&engine, &registry, &tree, "Flow", InsertPosition::Beneath);
    assert_eq!(suggested, vec!["Null -name Null"]);
}

#[test]
fn test_invalid_rules_are_dropped_at_load() {
    let registry = Registry::builtin().unwrap();
    let engine = SuggestionEngine::load(
        SuggestionScope::Actor,
        &registry,
        "# comment\nIF PARENT IS Nope THEN Display\nnot a rule\nIF ISLAST THEN Null\n",
        Vec::new(),
    );
    assert_eq!(engine.rules().len(), 1);
    assert_eq!(engine.rejected().len(), 2);
    assert!(engine.rejected()[0].0.contains("Nope"));
}

#[test]
fn test_role_restricted_container_filters_everything() {
    let catalogue = r#"{
        "rootType": "Root",
        "dataTypes": { "Object": [] },
        "types": [
            { "id": "Root", "container": { "canContainStandalones": true, "canContainSource": true } },
            {
                "id": "TransformOnly",
                "accepts": ["Object"],
                "generates": ["Object"],
                "container": { "restrictions": ["role:transformer"] }
            },
            { "id": "TypeX", "accepts": ["Object"] },
            { "id": "Step", "accepts": ["Object"], "generates": ["Object"] }
        ]
    }"#;
    let registry = Registry::from_json(catalogue).unwrap();
    let tree = tree(
        &registry,
        Component::new("Root", "Root").with_child(Component::new("TransformOnly", "box")),
    );

    let only_sink = SuggestionEngine::from_rules(SuggestionScope::Actor, &registry, ["IF TRUE THEN TypeX"], Vec::new());
    assert!(insert(&only_sink, &registry, &tree, "Root.box", InsertPosition::Beneath).is_empty());

    let mixed = SuggestionEngine::from_rules(
        SuggestionScope::Actor,
        &registry,
        ["IF TRUE THEN TypeX", "IF PARENT IS TransformOnly THEN Step"],
        Vec::new(),
    );
    assert_eq!(
        insert(&mixed, &registry, &tree, "Root.box", InsertPosition::Beneath),
        vec!["Step -name Step"]
    );
}

#[test]
fn test_external_reference_follows_selection_ends() {
    let (registry, _, external) = builtin();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("PassThrough", "pass"))
            .with_child(Component::new("Display", "show")),
    );
    let start = node(&tree, "Flow.start");
    let pass = node(&tree, "Flow.pass");
    let show = node(&tree, "Flow.show");

    let head = SuggestionContext::for_selection(&tree, &registry, &[start, pass]).unwrap();
    assert_eq!(
        lines(&external.suggest(&registry, &head)),
        vec!["ExternalSource -name ExternalSource -file \"\""]
    );

    let tail = SuggestionContext::for_selection(&tree, &registry, &[pass, show]).unwrap();
    let suggested = external.suggest(&registry, &tail);
    assert_eq!(suggested.len(), 1);
    assert_eq!(suggested[0].type_id, "ExternalSink");

    let middle = SuggestionContext::for_selection(&tree, &registry, &[pass]).unwrap();
    let suggested = external.suggest(&registry, &middle);
    assert_eq!(suggested[0].type_id, "ExternalTransformer");
}

#[test]
fn test_this_is_the_selected_or_displaced_node() {
    let registry = Registry::builtin().unwrap();
    let tree = tree(
        &registry,
        Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("PassThrough", "pass"))
            .with_child(Component::new("Display", "show")),
    );

    let external = SuggestionEngine::load(
        SuggestionScope::External,
        &registry,
        "IF THIS IS SINK THEN ExternalSink\nIF THIS IS TRANSFORMER THEN ExternalTransformer\n",
        Vec::new(),
    );
    let show = SuggestionContext::for_selection(&tree, &registry, &[node(&tree, "Flow.show")]).unwrap();
    assert_eq!(show.this().unwrap().name, "show");
    assert_eq!(external.suggest(&registry, &show)[0].type_id, "ExternalSink");
    let pass = SuggestionContext::for_selection(&tree, &registry, &[node(&tree, "Flow.pass")]).unwrap();
    assert_eq!(external.suggest(&registry, &pass)[0].type_id, "ExternalTransformer");

    let actor = SuggestionEngine::load(
        SuggestionScope::Actor,
        &registry,
        "IF THIS IS SINK THEN PassThrough\n",
        Vec::new(),
    );
    let here = SuggestionContext::for_insert(&tree, &registry, node(&tree, "Flow.show"), InsertPosition::Here).unwrap();
    assert_eq!(here.this().unwrap().name, "show");
    assert_eq!(actor.suggest(&registry, &here)[0].type_id, "PassThrough");
}
