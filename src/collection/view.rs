//! Collection view and item behaviors.
//!
//! A collection view is a real widget that owns an item store, a recycling
//! renderer and an id-based selection. Its children are item nodes: virtual
//! nodes that forward their existence into the store instead of parenting
//! into the widget tree. Store mutations are ordered by commit priority:
//! removals run ahead of everything, model synchronization runs last.

use crate::collection::{CollectionHandles, StoreHandle};
use crate::collection::renderer::ItemRenderer;
use crate::collection::selection::SelectionState;
use crate::collection::store::ItemStore;
use crate::collection::tree_store::TreeItemStore;
use crate::error::{Error, Result};
use crate::node::widget::{apply_props, construct_native};
use crate::node::{BridgeTree, NodeBehavior, NodeId, NodeRole};
use crate::props::{ItemId, PropValue, Props, SignalArgs, SignalHandler};
use crate::scheduler::{CommitPriority, DeferredAction};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{error, warn};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ViewKind {
    /// One flat sibling list (list and grid widgets).
    Flat,
    /// Per-parent sibling lists with lazily created child models.
    Tree,
}

pub struct ItemViewBehavior {
    kind: ViewKind,
    handles: Option<CollectionHandles>,
    selection: Rc<RefCell<SelectionState>>,
    /// Latest driver-supplied selection handler; the native subscription
    /// stays stable and reads through this cell.
    selection_handler: Rc<RefCell<Option<SignalHandler>>>,
}

impl ItemViewBehavior {
    pub fn new(kind: ViewKind) -> Self {
        Self {
            kind,
            handles: None,
            selection: Rc::new(RefCell::new(SelectionState::new())),
            selection_handler: Rc::new(RefCell::new(None)),
        }
    }

    fn handles(&self) -> Result<&CollectionHandles> {
        self.handles.as_ref().ok_or(Error::NodeUnavailable)
    }

    fn push_selection(&self, tree: &BridgeTree, node: NodeId) -> Result<()> {
        let Some(native) = tree.native(node)? else {
            return Ok(());
        };
        let handles = self.handles()?;
        let store = handles.store.clone();
        let indices = self.selection.borrow().indices_for(|id| store.index_of(id));
        let _guard = tree.env().signals.blocked();
        tree.env().toolkit.set_view_selected(native, &indices)
    }
}

impl NodeBehavior for ItemViewBehavior {
    fn create(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let native = construct_native(tree, node)?;
        let env = tree.env().clone();

        let store = match self.kind {
            ViewKind::Flat => StoreHandle::Flat(Rc::new(RefCell::new(ItemStore::new(env.toolkit.clone())?))),
            ViewKind::Tree => StoreHandle::Tree(Rc::new(RefCell::new(TreeItemStore::new(env.toolkit.clone())?))),
        };

        let lookup_store = store.clone();
        let renderer = ItemRenderer::new(env.clone(), move |id| lookup_store.payload(id));

        // Payload updates re-render whatever is currently displaying them.
        let rebind = renderer.clone();
        store.set_on_updated(Some(Rc::new(move |id: &ItemId| {
            if let Err(err) = rebind.rebind_item(id) {
                error!(%id, ?err, "rebind after item update failed");
            }
        })));

        // Removals shift native indices under the selection; one coalesced
        // re-push per commit keeps the view consistent. Ids of removed items
        // leave the selection for good, and the driver hears about it.
        let refresh = {
            let toolkit = env.toolkit.clone();
            let signals = env.signals.clone();
            let refresh_store = store.clone();
            let selection = self.selection.clone();
            let handler_cell = self.selection_handler.clone();
            DeferredAction::new(CommitPriority::Low, move || {
                let (dropped, ids, indices) = {
                    let mut selection = selection.borrow_mut();
                    let dropped = selection.retain_known(|id| refresh_store.index_of(id));
                    let indices = selection.indices_for(|id| refresh_store.index_of(id));
                    (dropped, selection.ids(), indices)
                };
                {
                    let _guard = signals.blocked();
                    if let Err(err) = toolkit.set_view_selected(native, &indices) {
                        error!(?err, "selection refresh failed");
                    }
                }
                if dropped {
                    let handler = handler_cell.borrow().clone();
                    if let Some(handler) = handler {
                        handler(&SignalArgs {
                            target: native,
                            payload: PropValue::Ids(ids),
                        });
                    }
                }
            })
        };

        self.handles = Some(CollectionHandles {
            store,
            renderer,
            selection_refresh: refresh,
        });
        Ok(())
    }

    fn commit_update(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()> {
        let handles = self.handles()?.clone();

        if crate::props::has_changed(old, new, "render_item") {
            handles.renderer.set_render(new.get("render_item").and_then(|v| v.as_render()).cloned());
        }
        if crate::props::has_changed(old, new, "estimated_item_height") {
            handles
                .renderer
                .set_estimated_height(new.get("estimated_item_height").and_then(|v| v.as_int()));
        }
        if crate::props::has_changed(old, new, "on_selection_changed") {
            *self.selection_handler.borrow_mut() = new
                .get("on_selection_changed")
                .and_then(|v| v.as_handler())
                .cloned();
        }
        if crate::props::has_changed(old, new, "selected") {
            if let Some(PropValue::Ids(ids)) = new.get("selected") {
                self.selection.borrow_mut().set_ids(ids);
            } else {
                self.selection.borrow_mut().clear();
            }
            if old.is_some() {
                self.push_selection(tree, node)?;
            }
        }

        apply_props(tree, node, old, new)
    }

    fn finalize(&mut self, _tree: &mut BridgeTree, _node: NodeId) -> Result<bool> {
        Ok(true)
    }

    fn commit_mount(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let Some(native) = tree.native(node)? else {
            return Ok(());
        };
        let env = tree.env().clone();
        let handles = self.handles()?.clone();

        env.toolkit.set_view_factory(native, Some(handles.renderer.clone()))?;
        env.toolkit.set_view_model(native, Some(handles.store.model()))?;

        // One stable native subscription translating index sets into id
        // sets. The driver's handler of the moment is read through a cell,
        // so prop updates never resubscribe.
        let store = handles.store.clone();
        let selection = self.selection.clone();
        let handler_cell = self.selection_handler.clone();
        let wrapper: SignalHandler = Rc::new(move |args: &SignalArgs| {
            let PropValue::Indices(indices) = &args.payload else {
                return;
            };
            let ids = {
                let mut selection = selection.borrow_mut();
                selection.set_from_indices(indices, |index| store.id_at(index));
                selection.ids()
            };
            let handler = handler_cell.borrow().clone();
            if let Some(handler) = handler {
                handler(&SignalArgs {
                    target: args.target,
                    payload: PropValue::Ids(ids),
                });
            }
        });
        let owner = tree.owner(node)?;
        env.signals.set(owner, native, "selection_changed", Some(wrapper))?;

        self.push_selection(tree, node)
    }

    fn can_accept_child(&self, tree: &BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        if tree.role(child)? == NodeRole::Item {
            Ok(())
        } else {
            Err(Error::InvalidChild {
                child: tree.type_name(child)?.to_string(),
                parent: tree.type_name(node)?.to_string(),
            })
        }
    }

    fn detach(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let Some(handles) = self.handles.take() else {
            return Ok(());
        };
        handles.renderer.clear()?;
        if let Some(native) = tree.native(node)? {
            tree.env().toolkit.set_view_factory(native, None)?;
            tree.env().toolkit.set_view_model(native, None)?;
        }
        handles.store.release()?;
        *self.selection_handler.borrow_mut() = None;
        Ok(())
    }

    fn collection(&self) -> Option<CollectionHandles> {
        self.handles.clone()
    }
}

/// A collection item: virtual, id-keyed, forwarded into the nearest
/// ancestor view's store. Nested items become children in hierarchical
/// stores.
pub struct ItemBehavior {
    id: ItemId,
    parent_item: Option<ItemId>,
    host: Option<CollectionHandles>,
    removed: bool,
}

impl ItemBehavior {
    pub fn new() -> Self {
        Self {
            id: ItemId::new(),
            parent_item: None,
            host: None,
            removed: false,
        }
    }

    fn schedule_remove(&mut self, tree: &BridgeTree) {
        if self.removed {
            return;
        }
        self.removed = true;
        let Some(handles) = self.host.clone() else {
            return;
        };
        let id = self.id.clone();
        let store = handles.store.clone();
        let scheduler = tree.env().scheduler.clone();
        scheduler.schedule_after_commit(CommitPriority::High, move || {
            if let Err(err) = store.remove(&id) {
                error!(%id, ?err, "item removal failed");
            }
        });
        handles.selection_refresh.schedule(&scheduler);
    }
}

impl NodeBehavior for ItemBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Item
    }

    fn create(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()> {
        let id = tree
            .props(node)?
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MissingItemId {
                type_name: tree.type_name(node).map(|t| t.to_string()).unwrap_or_default(),
            })?;
        self.id = ItemId::from(id);
        Ok(())
    }

    fn commit_update(
        &mut self,
        tree: &mut BridgeTree,
        _node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()> {
        if old.is_none() {
            // Initial payload travels with the attach.
            return Ok(());
        }
        if crate::props::has_changed(old, new, "id") {
            warn!(id = %self.id, "item id changed after creation, ignored");
        }
        if !crate::props::has_changed(old, new, "value") {
            return Ok(());
        }
        let Some(handles) = self.host.clone() else {
            return Ok(());
        };
        let id = self.id.clone();
        let payload = new.get("value").cloned().unwrap_or(PropValue::Null);
        tree.env().scheduler.schedule_after_commit(CommitPriority::Low, move || {
            if let Err(err) = handles.store.update(&id, payload) {
                error!(%id, ?err, "item update failed");
            }
        });
        Ok(())
    }

    fn can_accept_child(&self, tree: &BridgeTree, node: NodeId, child: NodeId) -> Result<()> {
        if tree.role(child)? == NodeRole::Item {
            Ok(())
        } else {
            Err(Error::InvalidChild {
                child: tree.type_name(child)?.to_string(),
                parent: tree.type_name(node)?.to_string(),
            })
        }
    }

    fn added_to_parent(&mut self, tree: &mut BridgeTree, node: NodeId, parent: NodeId) -> Result<()> {
        // Find the hosting view, noting the nearest item ancestor on the
        // way up for hierarchical placement.
        let mut cursor = Some(parent);
        let mut parent_item = None;
        let mut host = None;
        while let Some(current) = cursor {
            if tree.role(current)? == NodeRole::Item && parent_item.is_none() {
                parent_item = tree
                    .props(current)?
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(ItemId::from);
            }
            host = tree.with_behavior(current, |behavior, _| Ok(behavior.collection()))?;
            if host.is_some() {
                break;
            }
            cursor = tree.parent(current)?;
        }
        let Some(handles) = host else {
            warn!(id = %self.id, "item attached outside any collection view");
            return Ok(());
        };
        self.parent_item = parent_item;
        self.host = Some(handles.clone());
        self.removed = false;

        // The sibling to insert ahead of is the next item node after us.
        let siblings = tree.children(parent)?;
        let own_position = siblings.iter().position(|c| *c == node).unwrap_or(siblings.len());
        let mut reference = None;
        for sibling in &siblings[own_position + 1..] {
            if tree.role(*sibling)? == NodeRole::Item {
                reference = tree
                    .props(*sibling)?
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(ItemId::from);
                break;
            }
        }

        let id = self.id.clone();
        let parent_item = self.parent_item.clone();
        let payload = tree.props(node)?.get("value").cloned().unwrap_or(PropValue::Null);
        tree.env().scheduler.schedule_after_commit(CommitPriority::Normal, move || {
            if let Err(err) =
                handles
                    .store
                    .insert_before(parent_item.as_ref(), &id, payload, reference.as_ref())
            {
                error!(%id, ?err, "item insert failed");
            }
        });
        Ok(())
    }

    fn removed_from_parent(&mut self, tree: &mut BridgeTree, _node: NodeId, _parent: NodeId) -> Result<()> {
        self.schedule_remove(tree);
        Ok(())
    }

    fn detach(&mut self, tree: &mut BridgeTree, _node: NodeId) -> Result<()> {
        self.schedule_remove(tree);
        Ok(())
    }
}
