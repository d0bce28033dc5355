/// Driver-level commit scenarios: building, reordering and destroying a
/// widget tree through the mutation surface a reconciler drives.
use std::cell::Cell;
use std::rc::Rc;
use trellis::headless::HeadlessToolkit;
use trellis::node::registry::NodeRegistry;
use trellis::{
    BridgeTree, ContainerKind, Env, Error, NodeId, PropValue, Props, SecondChildPolicy, Toolkit,
    TypeTable,
};

fn fixture() -> (Rc<HeadlessToolkit>, BridgeTree) {
    let toolkit = Rc::new(HeadlessToolkit::new());
    let types = Rc::new(
        TypeTable::builder()
            .ty("Window")
            .container(ContainerKind::SingleChild {
                on_second_child: SecondChildPolicy::Reject,
            })
            .register()
            .ty("Overlay")
            .container(ContainerKind::SingleChild {
                on_second_child: SecondChildPolicy::Replace,
            })
            .register()
            .ty("Box")
            .container(ContainerKind::MultiChild)
            .property("spacing", "set_spacing", Some("spacing"))
            .register()
            .ty("Label")
            .property("label", "set_label", Some("label"))
            .register()
            .ty("Button")
            .property("label", "set_label", Some("label"))
            .signal("on_clicked", "clicked")
            .register()
            .build(),
    );
    let registry = Rc::new(NodeRegistry::with_builtins(types.clone()));
    let env = Env::new(toolkit.clone(), types, registry);
    (toolkit, BridgeTree::new(env))
}

fn label(tree: &mut BridgeTree, text: &str) -> NodeId {
    tree.create_node("Label", Props::new().with("label", text)).unwrap()
}

fn labels_of(toolkit: &HeadlessToolkit, tree: &BridgeTree, parent: NodeId) -> Vec<String> {
    let native = tree.native(parent).unwrap().unwrap();
    toolkit
        .children_of(native)
        .into_iter()
        .map(|child| {
            toolkit
                .property(child, "set_label")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        })
        .collect()
}

#[test]
fn test_mount_builds_native_hierarchy() {
    let (toolkit, mut tree) = fixture();

    let window = tree.create_node("Window", Props::new()).unwrap();
    let body = tree.create_node("Box", Props::new().with("spacing", 8i64)).unwrap();
    let hello = label(&mut tree, "hello");

    tree.append_initial_child(body, hello).unwrap();
    tree.append_initial_child(window, body).unwrap();
    tree.finalize_initial_children(window).unwrap();

    let window_native = tree.native(window).unwrap().unwrap();
    let body_native = tree.native(body).unwrap().unwrap();
    assert_eq!(toolkit.children_of(window_native), vec![body_native]);
    assert_eq!(toolkit.property(body_native, "set_spacing"), Some(PropValue::Int(8)));
    assert_eq!(labels_of(&toolkit, &tree, body), vec!["hello"]);
}

#[test]
fn test_insert_before_preserves_document_order() {
    let (toolkit, mut tree) = fixture();
    let body = tree.create_node("Box", Props::new()).unwrap();

    let a = label(&mut tree, "a");
    let d = label(&mut tree, "d");
    tree.append_child(body, a).unwrap();
    tree.append_child(body, d).unwrap();

    let b = label(&mut tree, "b");
    let c = label(&mut tree, "c");
    tree.insert_before(body, b, d).unwrap();
    tree.insert_before(body, c, d).unwrap();

    assert_eq!(labels_of(&toolkit, &tree, body), vec!["a", "b", "c", "d"]);
    assert_eq!(tree.children(body).unwrap(), vec![a, b, c, d]);
}

#[test]
fn test_reinserting_existing_child_repositions_it() {
    let (toolkit, mut tree) = fixture();
    let body = tree.create_node("Box", Props::new()).unwrap();

    let a = label(&mut tree, "a");
    let b = label(&mut tree, "b");
    let c = label(&mut tree, "c");
    for child in [a, b, c] {
        tree.append_child(body, child).unwrap();
    }

    tree.insert_before(body, c, a).unwrap();

    assert_eq!(labels_of(&toolkit, &tree, body), vec!["c", "a", "b"]);
}

#[test]
fn test_insert_before_missing_reference_fails() {
    let (_, mut tree) = fixture();
    let body = tree.create_node("Box", Props::new()).unwrap();
    let a = label(&mut tree, "a");
    let stray = label(&mut tree, "stray");

    assert!(matches!(
        tree.insert_before(body, a, stray),
        Err(Error::MissingReference { .. })
    ));
}

#[test]
fn test_single_child_replace_policy_swaps_native_child() {
    let (toolkit, mut tree) = fixture();
    let overlay = tree.create_node("Overlay", Props::new()).unwrap();
    let first = label(&mut tree, "first");
    let second = label(&mut tree, "second");

    tree.append_child(overlay, first).unwrap();
    tree.append_child(overlay, second).unwrap();

    let overlay_native = tree.native(overlay).unwrap().unwrap();
    let second_native = tree.native(second).unwrap().unwrap();
    assert_eq!(toolkit.children_of(overlay_native), vec![second_native]);

    // The displaced child is unlinked bridge-side too and stays usable.
    assert_eq!(tree.children(overlay).unwrap(), vec![second]);
    assert_eq!(tree.parent(first).unwrap(), None);
    let elsewhere = tree.create_node("Box", Props::new()).unwrap();
    tree.append_child(elsewhere, first).unwrap();
    let first_native = tree.native(first).unwrap().unwrap();
    assert_eq!(toolkit.parent_of(first_native), Some(tree.native(elsewhere).unwrap().unwrap()));
}

#[test]
fn test_moving_a_child_between_parents_is_atomic() {
    let (toolkit, mut tree) = fixture();
    let left = tree.create_node("Box", Props::new()).unwrap();
    let right = tree.create_node("Box", Props::new()).unwrap();
    let child = label(&mut tree, "wanderer");

    tree.append_child(left, child).unwrap();
    tree.remove_child(left, child).unwrap();
    tree.append_child(right, child).unwrap();

    let left_native = tree.native(left).unwrap().unwrap();
    let right_native = tree.native(right).unwrap().unwrap();
    let child_native = tree.native(child).unwrap().unwrap();
    assert!(toolkit.children_of(left_native).is_empty());
    assert_eq!(toolkit.children_of(right_native), vec![child_native]);
    assert_eq!(toolkit.parent_of(child_native), Some(right_native));
}

#[test]
fn test_commit_update_applies_only_changed_props() {
    let (toolkit, mut tree) = fixture();
    let button = tree
        .create_node("Button", Props::new().with("label", "start"))
        .unwrap();
    let native = tree.native(button).unwrap().unwrap();
    let writes_before = toolkit
        .operations()
        .iter()
        .filter(|op| op.contains("set_label"))
        .count();

    tree.commit_update(button, Props::new().with("label", "start")).unwrap();
    let unchanged = toolkit
        .operations()
        .iter()
        .filter(|op| op.contains("set_label"))
        .count();
    assert_eq!(unchanged, writes_before);

    tree.commit_update(button, Props::new().with("label", "done")).unwrap();
    assert_eq!(toolkit.property(native, "set_label"), Some(PropValue::from("done")));
}

#[test]
fn test_detach_releases_subtree_and_signal_subscriptions() {
    let (toolkit, mut tree) = fixture();
    let hits = Rc::new(Cell::new(0));

    let body = tree.create_node("Box", Props::new()).unwrap();
    let counter = hits.clone();
    let button = tree
        .create_node(
            "Button",
            Props::new().with("on_clicked", PropValue::handler(move |_| counter.set(counter.get() + 1))),
        )
        .unwrap();
    let text = label(&mut tree, "inner");
    tree.append_child(body, button).unwrap();
    tree.append_child(body, text).unwrap();

    let body_native = tree.native(body).unwrap().unwrap();
    let button_native = tree.native(button).unwrap().unwrap();
    let text_native = tree.native(text).unwrap().unwrap();
    assert_eq!(toolkit.handler_count(button_native), 1);

    tree.detach_deleted_instance(body).unwrap();

    assert!(!toolkit.is_alive(body_native));
    assert!(!toolkit.is_alive(button_native));
    assert!(!toolkit.is_alive(text_native));
    assert_eq!(tree.node_count(), 0);

    // Destroyed nodes reject further operations.
    assert!(matches!(tree.commit_update(body, Props::new()), Err(Error::NodeUnavailable)));
}

#[test]
fn test_root_attachment_and_ordering() {
    let toolkit = Rc::new(HeadlessToolkit::new());
    let types = Rc::new(
        TypeTable::builder()
            .ty("Label")
            .property("label", "set_label", Some("label"))
            .register()
            .build(),
    );
    let registry = Rc::new(NodeRegistry::with_builtins(types.clone()));
    let env = Env::new(toolkit.clone(), types, registry);

    let stage = toolkit.create_object("Stage", &[]).unwrap();
    let mut tree = BridgeTree::with_root(env, Some(stage));

    let a = label(&mut tree, "a");
    let c = label(&mut tree, "c");
    tree.append_to_root(a).unwrap();
    tree.append_to_root(c).unwrap();
    let b = label(&mut tree, "b");
    tree.insert_in_root_before(b, c).unwrap();

    let natives: Vec<_> = [a, b, c]
        .iter()
        .map(|n| tree.native(*n).unwrap().unwrap())
        .collect();
    assert_eq!(toolkit.children_of(stage), natives);

    tree.remove_from_root(b).unwrap();
    assert_eq!(toolkit.children_of(stage).len(), 2);

    tree.clear_root().unwrap();
    assert!(toolkit.children_of(stage).is_empty());
    assert_eq!(tree.node_count(), 1); // only the detached `b` remains
}
