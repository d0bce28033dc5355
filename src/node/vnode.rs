//! Behaviors for nodes with no native parent slot of their own.
//!
//! A slot node routes its single child into a named property of the
//! enclosing widget. A positioned child places its child into a coordinate
//! grid. A controller node wraps an event-controller object that attaches to
//! the enclosing widget rather than parenting into it.

use crate::error::{Error, Result};
use crate::node::widget::{apply_props, construct_native};
use crate::node::{BridgeTree, NodeBehavior, NodeId, NodeRole};
use crate::props::{Key, PropValue, Props};
use crate::scheduler::CommitPriority;
use crate::toolkit::ObjectId;
use tracing::{error, trace};

/// Routes its single child into `parent.<slot prop>`. The slot name comes
/// from the node's `id` prop and must name a property on the parent type.
pub struct SlotBehavior {
    slot_prop: Key,
    /// (parent native, setter) once wired.
    target: Option<(ObjectId, Key)>,
    cleared: bool,
}

impl SlotBehavior {
    pub fn new() -> Self {
        Self {
            slot_prop: Key::new(),
            target: None,
            cleared: false,
        }
    }

    fn wire(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let Some(parent) = tree.parent(node)? else {
            return Ok(());
        };
        let Some(parent_native) = tree.native(parent)? else {
            return Ok(());
        };
        let parent_type = tree.type_name(parent)?;
        let setter = tree
            .env()
            .types
            .property(&parent_type, &self.slot_prop)
            .map(|meta| meta.setter.clone())
            .ok_or_else(|| Error::UnknownSlot {
                type_name: parent_type.to_string(),
                prop: self.slot_prop.to_string(),
            })?;

        let child_native = match tree.children(node)?.first() {
            Some(child) => tree.native(*child)?,
            None => None,
        };
        if let Some(child_native) = child_native {
            tree.env()
                .toolkit
                .set_property(parent_native, &setter, &PropValue::Object(child_native))?;
            self.target = Some((parent_native, setter));
            self.cleared = false;
        }
        Ok(())
    }

    fn clear_once(&mut self, tree: &BridgeTree) -> Result<()> {
        if self.cleared {
            return Ok(());
        }
        if let Some((parent_native, setter)) = self.target.take() {
            tree.env().toolkit.set_property(parent_native, &setter, &PropValue::Null)?;
        }
        self.cleared = true;
        Ok(())
    }
}

impl NodeBehavior for SlotBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Virtual
    }

    fn create(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let name = tree
            .props(node)?
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or(Error::SlotWithoutId)?;
        self.slot_prop = Key::from(name);
        Ok(())
    }

    fn commit_update(
        &mut self,
        _tree: &mut BridgeTree,
        _node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()> {
        if old.is_some() && crate::props::has_changed(old, new, "id") {
            trace!("slot id changed after creation, ignored");
        }
        Ok(())
    }

    fn can_accept_child(&self, tree: &BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        if tree.children(node)?.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidChild {
                child: tree.type_name(child)?.to_string(),
                parent: "Slot".into(),
            })
        }
    }

    fn child_attached(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        _child: NodeId,
        _before: Option<NodeId>,
    ) -> Result<()> {
        self.wire(tree, node)
    }

    fn added_to_parent(&mut self, tree: &mut BridgeTree, node: NodeId, _parent: NodeId) -> Result<()> {
        self.wire(tree, node)
    }

    fn child_detached(&mut self, tree: &mut BridgeTree, _node: NodeId, _child: NodeId) -> Result<()> {
        self.clear_once(tree)
    }

    fn removed_from_parent(
        &mut self,
        tree: &mut BridgeTree,
        _node: NodeId,
        _parent: NodeId,
    ) -> Result<()> {
        self.clear_once(tree)
    }

    fn detach(&mut self, tree: &mut BridgeTree, _node: NodeId) -> Result<()> {
        self.clear_once(tree)
    }
}

fn position_of(props: &Props) -> (i64, i64, i64, i64) {
    let int = |key: &str, default: i64| props.get(key).and_then(|v| v.as_int()).unwrap_or(default);
    (
        int("column", 0),
        int("row", 0),
        int("column_span", 1),
        int("row_span", 1),
    )
}

const POSITION_PROPS: [&str; 4] = ["column", "row", "column_span", "row_span"];

/// Places its single child at grid coordinates on the enclosing widget.
/// Position changes detach at removal priority and re-attach at normal
/// priority so reshuffles never collide inside one commit.
pub struct PositionedChildBehavior {
    attached: Option<(ObjectId, ObjectId)>,
}

impl PositionedChildBehavior {
    pub fn new() -> Self {
        Self { attached: None }
    }

    fn attach(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let Some(parent) = tree.parent(node)? else {
            return Ok(());
        };
        let Some(parent_native) = tree.native(parent)? else {
            return Ok(());
        };
        let child_native = match tree.children(node)?.first() {
            Some(child) => tree.native(*child)?,
            None => None,
        };
        let Some(child_native) = child_native else {
            return Ok(());
        };
        let (column, row, column_span, row_span) = position_of(tree.props(node)?);
        tree.env()
            .toolkit
            .attach_at(parent_native, child_native, column, row, column_span, row_span)?;
        self.attached = Some((parent_native, child_native));
        Ok(())
    }
}

impl NodeBehavior for PositionedChildBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Virtual
    }

    fn create(&mut self, _tree: &mut BridgeTree, _node: NodeId) -> Result<()> {
        Ok(())
    }

    fn commit_update(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()> {
        if old.is_none() {
            return Ok(());
        }
        let moved = POSITION_PROPS
            .iter()
            .any(|key| crate::props::has_changed(old, new, key));
        if !moved {
            return Ok(());
        }
        let Some((parent_native, child_native)) = self.attached else {
            return Ok(());
        };
        let toolkit = tree.env().toolkit.clone();
        let scheduler = &tree.env().scheduler;
        let (column, row, column_span, row_span) = position_of(new);

        let detach_toolkit = toolkit.clone();
        scheduler.schedule_after_commit(CommitPriority::High, move || {
            if let Err(err) = detach_toolkit.remove_child(parent_native, child_native) {
                error!(?err, "failed to detach repositioned child");
            }
        });
        scheduler.schedule_after_commit(CommitPriority::Normal, move || {
            if let Err(err) =
                toolkit.attach_at(parent_native, child_native, column, row, column_span, row_span)
            {
                error!(?err, "failed to re-attach repositioned child");
            }
        });
        Ok(())
    }

    fn can_accept_child(&self, tree: &BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        if tree.children(node)?.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidChild {
                child: tree.type_name(child)?.to_string(),
                parent: tree.type_name(node)?.to_string(),
            })
        }
    }

    fn child_attached(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        _child: NodeId,
        _before: Option<NodeId>,
    ) -> Result<()> {
        self.attach(tree, node)
    }

    fn added_to_parent(&mut self, tree: &mut BridgeTree, node: NodeId, _parent: NodeId) -> Result<()> {
        self.attach(tree, node)
    }

    fn child_detached(&mut self, tree: &mut BridgeTree, _node: NodeId, _child: NodeId) -> Result<()> {
        if let Some((parent_native, child_native)) = self.attached.take() {
            tree.env().toolkit.remove_child(parent_native, child_native)?;
        }
        Ok(())
    }

    fn removed_from_parent(
        &mut self,
        tree: &mut BridgeTree,
        _node: NodeId,
        _parent: NodeId,
    ) -> Result<()> {
        if let Some((parent_native, child_native)) = self.attached.take() {
            tree.env().toolkit.remove_child(parent_native, child_native)?;
        }
        Ok(())
    }
}

/// An event controller: owns a native object that is added to the enclosing
/// widget's controller list instead of its child list.
pub struct ControllerBehavior {
    host: Option<ObjectId>,
}

impl ControllerBehavior {
    pub fn new() -> Self {
        Self { host: None }
    }
}

impl NodeBehavior for ControllerBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Controller
    }

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
        Err(Error::InvalidChild {
            child: tree.type_name(child)?.to_string(),
            parent: tree.type_name(node)?.to_string(),
        })
    }

    fn added_to_parent(&mut self, tree: &mut BridgeTree, node: NodeId, parent: NodeId) -> Result<()> {
        let (Some(native), Some(widget)) = (tree.native(node)?, tree.native(parent)?) else {
            return Ok(());
        };
        tree.env().toolkit.add_controller(widget, native)?;
        self.host = Some(widget);
        Ok(())
    }

    fn removed_from_parent(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        _parent: NodeId,
    ) -> Result<()> {
        if let (Some(widget), Some(native)) = (self.host.take(), tree.native(node)?) {
            tree.env().toolkit.remove_controller(widget, native)?;
        }
        Ok(())
    }

    fn detach(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        if let (Some(widget), Some(native)) = (self.host.take(), tree.native(node)?) {
            tree.env().toolkit.remove_controller(widget, native)?;
        }
        Ok(())
    }
}
