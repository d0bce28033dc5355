/// Collection view scenarios: item nodes mirrored into native models,
/// id-based selection, and hierarchical stores.
use std::cell::RefCell;
use std::rc::Rc;
use trellis::headless::HeadlessToolkit;
use trellis::node::registry::NodeRegistry;
use trellis::{BridgeTree, Env, Error, ItemId, NodeId, PropValue, Props, TypeTable};

fn fixture() -> (Rc<HeadlessToolkit>, BridgeTree) {
    let toolkit = Rc::new(HeadlessToolkit::new());
    let types = Rc::new(
        TypeTable::builder()
            .ty("ListView").register()
            .ty("GridView").register()
            .ty("TreeView").register()
            .ty("Label")
            .property("label", "set_label", Some("label"))
            .register()
            .build(),
    );
    let registry = Rc::new(NodeRegistry::with_builtins(types.clone()));
    let env = Env::new(toolkit.clone(), types, registry);
    (toolkit, BridgeTree::new(env))
}

fn item(tree: &mut BridgeTree, id: &str, value: &str) -> NodeId {
    tree.create_node("Item", Props::new().with("id", id).with("value", value))
        .unwrap()
}

fn mounted_view(tree: &mut BridgeTree, type_name: &str, props: Props) -> NodeId {
    let view = tree.create_node(type_name, props).unwrap();
    assert!(tree.finalize_initial_children(view).unwrap());
    tree.commit_mount(view).unwrap();
    view
}

#[test]
fn test_items_mirror_into_the_model_in_document_order() {
    let (toolkit, mut tree) = fixture();
    let view = mounted_view(&mut tree, "ListView", Props::new());

    let a = item(&mut tree, "a", "1");
    let d = item(&mut tree, "d", "4");
    tree.append_child(view, a).unwrap();
    tree.append_child(view, d).unwrap();

    let b = item(&mut tree, "b", "2");
    let c = item(&mut tree, "c", "3");
    tree.insert_before(view, b, d).unwrap();
    tree.insert_before(view, c, d).unwrap();

    let native = tree.native(view).unwrap().unwrap();
    let model = toolkit.view_model(native).unwrap();
    assert_eq!(toolkit.model_ids(model), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_missing_item_id_is_rejected() {
    let (_, mut tree) = fixture();
    assert!(matches!(
        tree.create_node("Item", Props::new().with("value", "x")),
        Err(Error::MissingItemId { .. })
    ));
}

#[test]
fn test_non_item_children_are_rejected() {
    let (_, mut tree) = fixture();
    let view = mounted_view(&mut tree, "ListView", Props::new());
    let label = tree.create_node("Label", Props::new()).unwrap();

    assert!(matches!(
        tree.append_child(view, label),
        Err(Error::InvalidChild { .. })
    ));
}

#[test]
fn test_selection_prop_projects_ids_onto_indices() {
    let (toolkit, mut tree) = fixture();
    let view = mounted_view(
        &mut tree,
        "ListView",
        Props::new().with("selected", PropValue::Ids(vec!["b".into(), "d".into()])),
    );
    for (id, value) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")] {
        let node = item(&mut tree, id, value);
        tree.append_child(view, node).unwrap();
    }

    // Re-setting the same prop pushes the projection now that items exist.
    tree.commit_update(
        view,
        Props::new().with("selected", PropValue::Ids(vec!["b".into(), "d".into()])),
    )
    .unwrap();

    let native = tree.native(view).unwrap().unwrap();
    assert_eq!(toolkit.selected_indices(native), vec![1, 3]);
}

#[test]
fn test_selection_survives_removal_of_other_items() {
    let (toolkit, mut tree) = fixture();
    let seen: Rc<RefCell<Vec<Vec<ItemId>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let view = mounted_view(
        &mut tree,
        "ListView",
        Props::new().with(
            "on_selection_changed",
            PropValue::handler(move |args| {
                if let PropValue::Ids(ids) = &args.payload {
                    sink.borrow_mut().push(ids.clone());
                }
            }),
        ),
    );
    let nodes: Vec<NodeId> = [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]
        .iter()
        .map(|(id, value)| {
            let node = item(&mut tree, id, value);
            tree.append_child(view, node).unwrap();
            node
        })
        .collect();
    tree.commit_update(
        view,
        Props::new().with("selected", PropValue::Ids(vec!["b".into(), "d".into()])),
    )
    .unwrap();
    let native = tree.native(view).unwrap().unwrap();
    assert_eq!(toolkit.selected_indices(native), vec![1, 3]);
    let notifications_before = seen.borrow().len();

    tree.begin_commit();
    tree.remove_child(view, nodes[0]).unwrap();
    tree.detach_deleted_instance(nodes[0]).unwrap();
    tree.end_commit();

    // Same ids, shifted indices; the driver is not notified about its own
    // selection being re-pushed.
    assert_eq!(toolkit.selected_indices(native), vec![0, 2]);
    assert_eq!(seen.borrow().len(), notifications_before);
}

#[test]
fn test_removing_a_selected_item_clears_it_from_the_selection() {
    let (toolkit, mut tree) = fixture();
    let seen: Rc<RefCell<Vec<Vec<ItemId>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let on_changed = PropValue::handler(move |args| {
        if let PropValue::Ids(ids) = &args.payload {
            sink.borrow_mut().push(ids.clone());
        }
    });
    let view = mounted_view(
        &mut tree,
        "ListView",
        Props::new().with("on_selection_changed", on_changed.clone()),
    );
    let nodes: Vec<NodeId> = [("a", "1"), ("b", "2"), ("c", "3")]
        .iter()
        .map(|(id, value)| {
            let node = item(&mut tree, id, value);
            tree.append_child(view, node).unwrap();
            node
        })
        .collect();
    tree.commit_update(
        view,
        Props::new()
            .with("on_selection_changed", on_changed)
            .with("selected", PropValue::Ids(vec!["b".into()])),
    )
    .unwrap();
    let native = tree.native(view).unwrap().unwrap();
    assert_eq!(toolkit.selected_indices(native), vec![1]);

    tree.begin_commit();
    tree.remove_child(view, nodes[1]).unwrap();
    tree.detach_deleted_instance(nodes[1]).unwrap();
    tree.end_commit();

    // The id leaves the set for good and the driver hears about it.
    assert!(toolkit.selected_indices(native).is_empty());
    assert_eq!(seen.borrow().last().unwrap().clone(), Vec::<ItemId>::new());

    // A later item reusing the id must not come back selected.
    let reborn = item(&mut tree, "b", "5");
    tree.append_child(view, reborn).unwrap();
    tree.begin_commit();
    tree.remove_child(view, nodes[0]).unwrap();
    tree.detach_deleted_instance(nodes[0]).unwrap();
    tree.end_commit();
    assert!(toolkit.selected_indices(native).is_empty());
}

#[test]
fn test_native_selection_reaches_the_driver_as_ids() {
    let (toolkit, mut tree) = fixture();
    let seen: Rc<RefCell<Vec<Vec<ItemId>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let view = mounted_view(
        &mut tree,
        "ListView",
        Props::new().with(
            "on_selection_changed",
            PropValue::handler(move |args| {
                if let PropValue::Ids(ids) = &args.payload {
                    sink.borrow_mut().push(ids.clone());
                }
            }),
        ),
    );
    for (id, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
        let node = item(&mut tree, id, value);
        tree.append_child(view, node).unwrap();
    }

    let native = tree.native(view).unwrap().unwrap();
    toolkit
        .emit(native, "selection_changed", PropValue::Indices(vec![0, 2]))
        .unwrap();

    assert_eq!(
        seen.borrow().last().unwrap().clone(),
        vec![ItemId::from("a"), ItemId::from("c")]
    );
}

#[test]
fn test_replacing_the_selection_handler_does_not_resubscribe() {
    let (toolkit, mut tree) = fixture();
    let view = mounted_view(
        &mut tree,
        "ListView",
        Props::new().with("on_selection_changed", PropValue::handler(|_| {})),
    );
    let native = tree.native(view).unwrap().unwrap();
    let connects = toolkit.connect_count();

    tree.commit_update(
        view,
        Props::new().with("on_selection_changed", PropValue::handler(|_| {})),
    )
    .unwrap();

    assert_eq!(toolkit.connect_count(), connects);
    assert_eq!(toolkit.handler_count(native), 1);
}

#[test]
fn test_tree_view_nests_items_into_child_models() {
    let (toolkit, mut tree) = fixture();
    let view = mounted_view(&mut tree, "TreeView", Props::new());

    let a = item(&mut tree, "a", "parent");
    tree.append_child(view, a).unwrap();
    let a1 = item(&mut tree, "a1", "child");
    let a2 = item(&mut tree, "a2", "child");
    tree.append_child(a, a1).unwrap();
    tree.append_child(a, a2).unwrap();

    let native = tree.native(view).unwrap().unwrap();
    let root_model = toolkit.view_model(native).unwrap();
    assert_eq!(toolkit.model_ids(root_model), vec!["a"]);

    // One extra model holds a's children.
    let models = toolkit.objects_of_type("ItemModel");
    assert_eq!(models.len(), 2);
    let child_model = models.into_iter().find(|m| *m != root_model).unwrap();
    assert_eq!(toolkit.model_ids(child_model), vec!["a1", "a2"]);

    // Removing the subtree drains and releases the child model.
    tree.begin_commit();
    tree.remove_child(view, a).unwrap();
    tree.detach_deleted_instance(a).unwrap();
    tree.end_commit();

    assert!(toolkit.model_ids(root_model).is_empty());
    assert!(!toolkit.is_alive(child_model));
}
