//! Node arena and the commit driver.
//!
//! A [`BridgeTree`] holds the bridge-side shadow of a native widget tree:
//! nodes live in a slot arena with a free list, each carrying its props, its
//! links, an optional native object handle and a boxed [`NodeBehavior`] that
//! decides how the node maps onto the toolkit. The reconciling driver talks
//! to the tree through a small mutation surface (create, append, insert,
//! remove, update, mount, detach) bracketed by `begin_commit`/`end_commit`.

pub mod registry;
pub mod vnode;
pub mod widget;

use crate::collection::CollectionHandles;
use crate::error::{Error, Result};
use crate::meta::{ContainerKind, SecondChildPolicy, TypeTable};
use crate::props::{Key, Props};
use crate::scheduler::Scheduler;
use crate::signal::{OwnerId, SignalStore};
use crate::toolkit::{ObjectId, Toolkit};
use registry::NodeRegistry;
use smallvec::SmallVec;
use std::rc::Rc;
use tracing::trace;

/// Shared services every tree and behavior needs.
pub struct Env {
    pub toolkit: Rc<dyn Toolkit>,
    pub signals: Rc<SignalStore>,
    pub types: Rc<TypeTable>,
    pub registry: Rc<NodeRegistry>,
    pub scheduler: Rc<Scheduler>,
}

impl Env {
    pub fn new(toolkit: Rc<dyn Toolkit>, types: Rc<TypeTable>, registry: Rc<NodeRegistry>) -> Rc<Self> {
        Rc::new(Self {
            signals: Rc::new(SignalStore::new(toolkit.clone())),
            scheduler: Rc::new(Scheduler::new()),
            toolkit,
            types,
            registry,
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Lifecycle {
    #[default]
    Unattached,
    Mounted,
    Unmounted,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeRole {
    Widget,
    Virtual,
    Controller,
    Item,
}

/// How a node participates in the tree. One implementation per node family;
/// the registry picks which one a type name gets.
///
/// Every hook receives the tree so behaviors can resolve siblings, ancestors
/// and shared services. While a hook runs, the node's own behavior is taken
/// out of its slot; re-entrant dispatch to the same node fails with
/// [`Error::NodeUnavailable`].
pub trait NodeBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Widget
    }

    /// Construct the native side (if any) and apply initial props.
    fn create(&mut self, tree: &mut BridgeTree, node: NodeId) -> Result<()>;

    /// Called once after all initial children are attached. Returning `true`
    /// requests a `commit_mount` call after the node is live in the tree.
    fn finalize(&mut self, _tree: &mut BridgeTree, _node: NodeId) -> Result<bool> {
        Ok(false)
    }

    fn commit_mount(&mut self, _tree: &mut BridgeTree, _node: NodeId) -> Result<()> {
        Ok(())
    }

    fn commit_update(
        &mut self,
        tree: &mut BridgeTree,
        node: NodeId,
        old: Option<&Props>,
        new: &Props,
    ) -> Result<()>;

    fn can_accept_child(&self, _tree: &BridgeTree, _node: NodeId, _child: NodeId) -> Result<()> {
        Ok(())
    }

    /// The child is linked under this node; mirror it natively. `before` is
    /// the bridge-side sibling the child was inserted ahead of, if any.
    fn child_attached(
        &mut self,
        _tree: &mut BridgeTree,
        _node: NodeId,
        _child: NodeId,
        _before: Option<NodeId>,
    ) -> Result<()> {
        Ok(())
    }

    fn child_detached(&mut self, _tree: &mut BridgeTree, _node: NodeId, _child: NodeId) -> Result<()> {
        Ok(())
    }

    fn added_to_parent(&mut self, _tree: &mut BridgeTree, _node: NodeId, _parent: NodeId) -> Result<()> {
        Ok(())
    }

    fn removed_from_parent(
        &mut self,
        _tree: &mut BridgeTree,
        _node: NodeId,
        _parent: NodeId,
    ) -> Result<()> {
        Ok(())
    }

    /// Last call before the node's resources are released.
    fn detach(&mut self, _tree: &mut BridgeTree, _node: NodeId) -> Result<()> {
        Ok(())
    }

    /// Collection views expose their item store and renderer here so that
    /// item children can find their host by walking up the tree.
    fn collection(&self) -> Option<CollectionHandles> {
        None
    }
}

struct Slot {
    type_name: Key,
    state: Lifecycle,
    props: Props,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    native: Option<ObjectId>,
    owner: OwnerId,
    role: NodeRole,
    behavior: Option<Box<dyn NodeBehavior>>,
}

pub struct BridgeTree {
    env: Rc<Env>,
    slots: Vec<Option<Slot>>,
    free: Vec<NodeId>,
    root_target: Option<ObjectId>,
    root_children: SmallVec<[NodeId; 4]>,
}

impl BridgeTree {
    pub fn new(env: Rc<Env>) -> Self {
        Self::with_root(env, None)
    }

    /// A tree whose top-level children are attached to `root_target`.
    pub fn with_root(env: Rc<Env>, root_target: Option<ObjectId>) -> Self {
        Self {
            env,
            slots: Vec::new(),
            free: Vec::new(),
            root_target,
            root_children: SmallVec::new(),
        }
    }

    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }

    pub fn root_target(&self) -> Option<ObjectId> {
        self.root_target
    }

    // ------------------------------------------------------------------
    // Slot access.

    fn slot(&self, node: NodeId) -> Result<&Slot> {
        self.slots
            .get(node.index())
            .and_then(|entry| entry.as_ref())
            .ok_or(Error::NodeUnavailable)
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut Slot> {
        self.slots
            .get_mut(node.index())
            .and_then(|entry| entry.as_mut())
            .ok_or(Error::NodeUnavailable)
    }

    pub fn type_name(&self, node: NodeId) -> Result<Key> {
        Ok(self.slot(node)?.type_name.clone())
    }

    pub fn native(&self, node: NodeId) -> Result<Option<ObjectId>> {
        Ok(self.slot(node)?.native)
    }

    pub(crate) fn set_native(&mut self, node: NodeId, native: Option<ObjectId>) -> Result<()> {
        self.slot_mut(node)?.native = native;
        Ok(())
    }

    pub fn props(&self, node: NodeId) -> Result<&Props> {
        Ok(&self.slot(node)?.props)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        Ok(self.slot(node)?.parent)
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.slot(node)?.children.to_vec())
    }

    pub fn state(&self, node: NodeId) -> Result<Lifecycle> {
        Ok(self.slot(node)?.state)
    }

    pub fn role(&self, node: NodeId) -> Result<NodeRole> {
        Ok(self.slot(node)?.role)
    }

    pub(crate) fn owner(&self, node: NodeId) -> Result<OwnerId> {
        Ok(self.slot(node)?.owner)
    }

    pub fn root_children(&self) -> Vec<NodeId> {
        self.root_children.to_vec()
    }

    /// Live node count, for leak checks.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_some()).count()
    }

    /// The nearest native object at or above `node`.
    pub fn resolve_native(&self, node: NodeId) -> Result<Option<ObjectId>> {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let slot = self.slot(current)?;
            if let Some(native) = slot.native {
                return Ok(Some(native));
            }
            cursor = slot.parent;
        }
        Ok(self.root_target)
    }

    /// First native object among `parent`'s children starting at the child
    /// `from`, used to translate a bridge sibling into a native sibling.
    pub(crate) fn native_sibling_from(&self, parent: NodeId, from: NodeId) -> Result<Option<ObjectId>> {
        let children = &self.slot(parent)?.children;
        let start = children.iter().position(|c| *c == from).unwrap_or(children.len());
        for child in &children[start..] {
            if let Some(native) = self.slot(*child)?.native {
                return Ok(Some(native));
            }
        }
        Ok(None)
    }

    pub(crate) fn with_behavior<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut dyn NodeBehavior, &mut BridgeTree) -> Result<R>,
    ) -> Result<R> {
        let mut behavior = self
            .slot_mut(node)?
            .behavior
            .take()
            .ok_or(Error::NodeUnavailable)?;
        let result = f(behavior.as_mut(), self);
        // The slot may have been freed during dispatch (self-removal).
        if let Some(slot) = self.slots.get_mut(node.index()).and_then(|entry| entry.as_mut()) {
            slot.behavior = Some(behavior);
        }
        result
    }

    // ------------------------------------------------------------------
    // Driver surface.

    pub fn create_node(&mut self, type_name: &str, props: Props) -> Result<NodeId> {
        let behavior = self.env.registry.resolve(type_name, &props)?;
        let role = behavior.role();
        let owner = self.env.signals.owner();
        let slot = Slot {
            type_name: Key::from(type_name),
            state: Lifecycle::Unattached,
            props,
            parent: None,
            children: SmallVec::new(),
            native: None,
            owner,
            role,
            behavior: Some(behavior),
        };
        let node = self.alloc(slot);
        trace!(?node, type_name, "create node");
        self.with_behavior(node, |b, tree| b.create(tree, node))
            .map_err(|err| {
                self.dispose(node);
                err
            })?;
        let props = self.slot(node)?.props.clone();
        self.with_behavior(node, |b, tree| b.commit_update(tree, node, None, &props))?;
        Ok(node)
    }

    /// Attach a child while its parent is still being built. Same semantics
    /// as [`append_child`](Self::append_child); kept separate so drivers can
    /// map their initial-build hook directly.
    pub fn append_initial_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.append_child(parent, child)
    }

    pub fn finalize_initial_children(&mut self, node: NodeId) -> Result<bool> {
        self.with_behavior(node, |b, tree| b.finalize(tree, node))
    }

    pub fn commit_mount(&mut self, node: NodeId) -> Result<()> {
        self.with_behavior(node, |b, tree| b.commit_mount(tree, node))
    }

    pub fn commit_update(&mut self, node: NodeId, new_props: Props) -> Result<()> {
        let old = std::mem::replace(&mut self.slot_mut(node)?.props, new_props.clone());
        self.with_behavior(node, |b, tree| b.commit_update(tree, node, Some(&old), &new_props))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_at(parent, child, None)
    }

    /// Insert `child` ahead of `reference`. The reference must currently be a
    /// child of `parent`. Re-inserting an existing child repositions it.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.insert_at(parent, child, Some(reference))
    }

    fn insert_at(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        self.with_behavior(parent, |b, tree| b.can_accept_child(tree, parent, child))?;

        let already_linked = self.slot(child)?.parent == Some(parent);
        if already_linked {
            // Reposition: detach natively first, then reinsert.
            self.with_behavior(parent, |b, tree| b.child_detached(tree, parent, child))?;
            self.slot_mut(parent)?.children.retain(|c| *c != child);
        } else if let Some(previous) = self.slot(child)?.parent {
            return Err(Error::InvalidChild {
                child: format!("{:?} (still attached to {previous:?})", child),
                parent: self.slot(parent)?.type_name.to_string(),
            });
        }

        // A replace-on-second-child container displaces its incumbent on
        // both sides, native seat and bridge links alike. Leaving the old
        // link in place would corrupt sibling resolution and subtree
        // teardown later.
        if !already_linked && self.slot(child)?.role == NodeRole::Widget {
            let parent_type = self.slot(parent)?.type_name.clone();
            if matches!(
                self.env.types.container_kind(&parent_type),
                ContainerKind::SingleChild {
                    on_second_child: SecondChildPolicy::Replace,
                }
            ) {
                let incumbent = self.slot(parent)?.children.iter().copied().find(|c| {
                    self.slot(*c).map(|s| s.role == NodeRole::Widget).unwrap_or(false)
                });
                if let Some(incumbent) = incumbent {
                    self.remove_child(parent, incumbent)?;
                }
            }
        }

        let index = match reference {
            Some(reference) => self
                .slot(parent)?
                .children
                .iter()
                .position(|c| *c == reference)
                .ok_or_else(|| Error::MissingReference {
                    parent: self.slot(parent).map(|s| s.type_name.to_string()).unwrap_or_default(),
                })?,
            None => self.slot(parent)?.children.len(),
        };
        self.slot_mut(parent)?.children.insert(index, child);
        self.slot_mut(child)?.parent = Some(parent);

        self.with_behavior(parent, |b, tree| b.child_attached(tree, parent, child, reference))?;
        if !already_linked {
            self.with_behavior(child, |b, tree| b.added_to_parent(tree, child, parent))?;
        }
        if self.slot(parent)?.state == Lifecycle::Mounted {
            self.mark_mounted(child)?;
        }
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.with_behavior(parent, |b, tree| b.child_detached(tree, parent, child))?;
        self.slot_mut(parent)?.children.retain(|c| *c != child);
        self.slot_mut(child)?.parent = None;
        self.with_behavior(child, |b, tree| b.removed_from_parent(tree, child, parent))
    }

    // ------------------------------------------------------------------
    // Root attachment.

    pub fn append_to_root(&mut self, child: NodeId) -> Result<()> {
        self.insert_in_root(child, None)
    }

    pub fn insert_in_root_before(&mut self, child: NodeId, reference: NodeId) -> Result<()> {
        self.insert_in_root(child, Some(reference))
    }

    fn insert_in_root(&mut self, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        self.root_children.retain(|c| *c != child);
        let index = match reference {
            Some(reference) => self
                .root_children
                .iter()
                .position(|c| *c == reference)
                .ok_or_else(|| Error::MissingReference {
                    parent: "root".into(),
                })?,
            None => self.root_children.len(),
        };
        self.root_children.insert(index, child);

        if let (Some(target), Some(native)) = (self.root_target, self.slot(child)?.native) {
            let native_reference = reference.and_then(|r| self.slot(r).ok().and_then(|s| s.native));
            match native_reference {
                Some(sibling) => self.env.toolkit.insert_child_before(target, native, Some(sibling))?,
                None => self.env.toolkit.append_child(target, native)?,
            }
        }
        self.mark_mounted(child)
    }

    pub fn remove_from_root(&mut self, child: NodeId) -> Result<()> {
        self.root_children.retain(|c| *c != child);
        if let (Some(target), Some(native)) = (self.root_target, self.slot(child)?.native) {
            self.env.toolkit.remove_child(target, native)?;
        }
        Ok(())
    }

    /// Detach and destroy everything attached to the root.
    pub fn clear_root(&mut self) -> Result<()> {
        for child in self.root_children() {
            self.remove_from_root(child)?;
            self.detach_deleted_instance(child)?;
        }
        Ok(())
    }

    fn mark_mounted(&mut self, node: NodeId) -> Result<()> {
        if self.slot(node)?.state == Lifecycle::Mounted {
            return Ok(());
        }
        self.slot_mut(node)?.state = Lifecycle::Mounted;
        for child in self.children(node)? {
            self.mark_mounted(child)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destruction.

    /// Tear a deleted subtree down, children first: behavior detach, signal
    /// cleanup, native release, then the slot itself. The node and all its
    /// descendants are unusable afterwards.
    pub fn detach_deleted_instance(&mut self, node: NodeId) -> Result<()> {
        for child in self.children(node)? {
            self.detach_deleted_instance(child)?;
        }
        self.with_behavior(node, |b, tree| b.detach(tree, node))?;

        let slot = self.slot(node)?;
        let owner = slot.owner;
        let native = slot.native;
        let releases_native = matches!(slot.role, NodeRole::Widget | NodeRole::Controller);
        self.env.signals.clear(owner);
        if let (Some(native), true) = (native, releases_native) {
            self.env.toolkit.release_object(native)?;
        }
        if let Ok(slot) = self.slot_mut(node) {
            slot.state = Lifecycle::Unmounted;
        }
        self.dispose(node);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit batching.

    pub fn begin_commit(&mut self) {
        self.env.scheduler.begin_commit();
    }

    pub fn end_commit(&mut self) {
        self.env.scheduler.end_commit();
    }

    // ------------------------------------------------------------------
    // Arena plumbing.

    fn alloc(&mut self, slot: Slot) -> NodeId {
        match self.free.pop() {
            Some(node) => {
                self.slots[node.index()] = Some(slot);
                node
            }
            None => {
                let node = NodeId(self.slots.len() as u32);
                self.slots.push(Some(slot));
                node
            }
        }
    }

    fn dispose(&mut self, node: NodeId) {
        if let Some(entry) = self.slots.get_mut(node.index()) {
            if entry.take().is_some() {
                self.root_children.retain(|c| *c != node);
                self.free.push(node);
            }
        }
    }
}
