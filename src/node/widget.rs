//! The plain widget behavior: a node backed one-to-one by a native object.
//!
//! Prop application is table-driven. Each changed key is looked up in the
//! type table: a signal row routes through the signal store, a property row
//! becomes a setter call, construct-only rows are consumed at construction
//! and ignored afterwards, and anything else is dropped with a trace.

use crate::error::{Error, Result};
use crate::meta::{ContainerKind, SecondChildPolicy};
use crate::node::{BridgeTree, NodeBehavior, NodeId, NodeRole};
use crate::props::{PropValue, Props};
use crate::toolkit::ObjectId;
use tracing::{trace, warn};

/// Create the node's native object, routing construct-only props as
/// construction arguments.
pub(crate) fn construct_native(tree: &mut BridgeTree, node: NodeId) -> Result<ObjectId> {
    let type_name = tree.type_name(node)?;
    let props = tree.props(node)?.clone();
    let types = tree.env().types.clone();

    let mut args: Vec<(crate::props::Key, PropValue)> = Vec::new();
    if let Some(meta) = types.get(&type_name) {
        for (prop, arg) in &meta.construct_only {
            if let Some(value) = props.get(prop) {
                args.push((arg.clone(), value.clone()));
            }
        }
    }

    let native = tree.env().toolkit.create_object(&type_name, &args)?;
    tree.set_native(node, Some(native))?;
    Ok(native)
}

/// Apply the delta between `old` and `new` props to the node's native
/// object. `old = None` means initial application.
pub(crate) fn apply_props(
    tree: &mut BridgeTree,
    node: NodeId,
    old: Option<&Props>,
    new: &Props,
) -> Result<()> {
    let Some(native) = tree.native(node)? else {
        return Ok(());
    };
    let type_name = tree.type_name(node)?;
    let owner = tree.owner(node)?;
    let env = tree.env().clone();

    for key in Props::changed_keys(old, new) {
        let value = new.get(&key);

        if let Some(signal) = env.types.signal(&type_name, &key) {
            let handler = value.and_then(|v| v.as_handler()).cloned();
            env.signals.set(owner, native, signal, handler)?;
            continue;
        }
        if env.types.is_construct_only(&type_name, &key) {
            if old.is_some() {
                warn!(%type_name, %key, "construct-only prop changed after construction, ignored");
            }
            continue;
        }
        if let Some(meta) = env.types.property(&type_name, &key) {
            let setter = meta.setter.clone();
            let value = value.cloned().unwrap_or(PropValue::Null);
            env.toolkit.set_property(native, &setter, &value)?;
            continue;
        }
        trace!(%type_name, %key, "prop has no table entry, skipped");
    }
    Ok(())
}

/// Clear the native single-child or content seat if `child_native` still
/// occupies it, respecting the container kind. Multi-child containers get a
/// plain removal.
fn detach_native_child(
    tree: &BridgeTree,
    parent_native: ObjectId,
    child_native: ObjectId,
    kind: ContainerKind,
) -> Result<()> {
    let toolkit = &tree.env().toolkit;
    if toolkit.child_parent(child_native)? != Some(parent_native) {
        return Ok(());
    }
    match kind {
        ContainerKind::SingleChild { .. } => toolkit.set_child(parent_native, None),
        ContainerKind::Content => toolkit.set_content(parent_native, None),
        _ => toolkit.remove_child(parent_native, child_native),
    }
}

#[derive(Default)]
pub struct WidgetBehavior;

impl WidgetBehavior {
    pub fn new() -> Self {
        Self
    }
}

impl NodeBehavior for WidgetBehavior {
    fn create(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        construct_native(tree, node)?;
        Ok(())
    }

    fn commit_update(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()> {
        apply_props(tree, node, old, new)
    }

    fn can_accept_child(&self, tree: &BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        // Controllers, slots and other virtual children never occupy a
        // native child seat, so the container kind does not constrain them.
        if tree.role(child)? != NodeRole::Widget {
            return Ok(());
        }
        let type_name = tree.type_name(node)?;
        match tree.env().types.container_kind(&type_name) {
            ContainerKind::Leaf => Err(Error::InvalidChild {
                child: tree.type_name(child)?.to_string(),
                parent: type_name.to_string(),
            }),
            ContainerKind::SingleChild {
                on_second_child: SecondChildPolicy::Reject,
            } if tree
                .children(node)?
                .iter()
                .any(|c| tree.role(*c).map(|r| r == NodeRole::Widget).unwrap_or(false)) =>
            {
                Err(Error::InvalidChild {
                    child: tree.type_name(child)?.to_string(),
                    parent: type_name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn child_attached(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<()> {
        // Only widget children attach here; virtual, controller and item
        // children handle their own native placement.
        if tree.role(child)? != NodeRole::Widget {
            return Ok(());
        }
        let Some(child_native) = tree.native(child)? else {
            return Ok(());
        };
        let Some(parent_native) = tree.native(node)? else {
            return Ok(());
        };
        let toolkit = tree.env().toolkit.clone();

        // A node moving between parents must leave its old parent first so
        // the native side never sees it in two places.
        if let Some(other) = toolkit.child_parent(child_native)? {
            if other != parent_native {
                toolkit.remove_child(other, child_native)?;
            }
        }

        let type_name = tree.type_name(node)?;
        match tree.env().types.container_kind(&type_name) {
            ContainerKind::MultiChild => {
                let sibling = match before {
                    Some(before) => tree.native_sibling_from(node, before)?,
                    None => None,
                };
                match sibling {
                    Some(sibling) => toolkit.insert_child_before(parent_native, child_native, Some(sibling)),
                    None => toolkit.append_child(parent_native, child_native),
                }
            }
            ContainerKind::SingleChild { .. } => toolkit.set_child(parent_native, Some(child_native)),
            ContainerKind::Content => toolkit.set_content(parent_native, Some(child_native)),
            ContainerKind::Leaf => Ok(()),
        }
    }

    fn child_detached(&mut self, tree: &mut BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        if tree.role(child)? != NodeRole::Widget {
            return Ok(());
        }
        let (Some(parent_native), Some(child_native)) = (tree.native(node)?, tree.native(child)?) else {
            return Ok(());
        };
        let type_name = tree.type_name(node)?;
        let kind = tree.env().types.container_kind(&type_name);
        detach_native_child(tree, parent_native, child_native, kind)
    }
}
