//! Recycling item renderer.
//!
//! Collection widgets recycle a small pool of display containers over a
//! large item set. Each container gets its own nested [`BridgeTree`] rooted
//! at an item box, keyed by the container's native identity rather than by
//! whichever item it currently shows. Teardown of a container's tree is
//! deferred to the next commit boundary so a teardown/setup pair for the
//! same container within one tick reuses nothing stale: setup finalizes any
//! pending teardown for its container before building fresh.

use crate::error::{Error, Result};
use crate::node::{BridgeTree, Env};
use crate::props::{ItemId, PropValue, RenderItem};
use crate::toolkit::{ContainerId, DisplayContainer, ItemFactory, ObjectId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{error, trace};

struct ContainerRoot {
    tree: Rc<RefCell<BridgeTree>>,
    item_box: ObjectId,
    bound: Option<ItemId>,
    torn_down: bool,
    height_cleared: bool,
}

pub struct ItemRenderer {
    env: Rc<Env>,
    weak: Weak<ItemRenderer>,
    render: RefCell<Option<RenderItem>>,
    lookup: Box<dyn Fn(&ItemId) -> Option<PropValue>>,
    roots: RefCell<HashMap<ContainerId, ContainerRoot>>,
    /// Applied to fresh item boxes until their first bind, to stabilize
    /// scroll estimation over unrendered rows.
    estimated_height: Cell<Option<i64>>,
}

impl ItemRenderer {
    pub fn new(env: Rc<Env>, lookup: impl Fn(&ItemId) -> Option<PropValue> + 'static) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            env,
            weak: weak.clone(),
            render: RefCell::new(None),
            lookup: Box::new(lookup),
            roots: RefCell::new(HashMap::new()),
            estimated_height: Cell::new(None),
        })
    }

    pub fn set_render(&self, render: Option<RenderItem>) {
        *self.render.borrow_mut() = render;
    }

    pub fn set_estimated_height(&self, height: Option<i64>) {
        self.estimated_height.set(height);
    }

    /// Live container roots, for leak checks.
    pub fn root_count(&self) -> usize {
        self.roots.borrow().len()
    }

    pub fn bound_item(&self, container: ContainerId) -> Option<ItemId> {
        self.roots.borrow().get(&container).and_then(|root| root.bound.clone())
    }

    /// Re-render every container currently displaying `id`.
    pub fn rebind_item(&self, id: &ItemId) -> Result<()> {
        let showing: Vec<ContainerId> = self
            .roots
            .borrow()
            .iter()
            .filter(|(_, root)| !root.torn_down && root.bound.as_ref() == Some(id))
            .map(|(container, _)| *container)
            .collect();
        for container in showing {
            self.render_into(container, Some(id))?;
        }
        Ok(())
    }

    /// Destroy every container root immediately. Used when the owning view
    /// goes away.
    pub fn clear(&self) -> Result<()> {
        let containers: Vec<ContainerId> = self.roots.borrow().keys().copied().collect();
        for container in containers {
            self.finalize(container)?;
        }
        Ok(())
    }

    fn fresh_root(&self, container: ContainerId) -> Result<()> {
        let item_box = self.env.toolkit.create_item_container()?;
        self.env.toolkit.set_container_child(container, Some(item_box))?;
        if let Some(height) = self.estimated_height.get() {
            self.env
                .toolkit
                .set_property(item_box, "set_height_request", &PropValue::Int(height))?;
        }
        let tree = BridgeTree::with_root(self.env.clone(), Some(item_box));
        self.roots.borrow_mut().insert(
            container,
            ContainerRoot {
                tree: Rc::new(RefCell::new(tree)),
                item_box,
                bound: None,
                torn_down: false,
                height_cleared: false,
            },
        );
        trace!(?container, "container root created");
        Ok(())
    }

    fn render_into(&self, container: ContainerId, item: Option<&ItemId>) -> Result<()> {
        let Some(render) = self.render.borrow().clone() else {
            return Ok(());
        };
        let tree = self
            .roots
            .borrow()
            .get(&container)
            .map(|root| root.tree.clone())
            .ok_or_else(|| Error::Render(format!("no root for container {container:?}")))?;
        let payload = item.and_then(|id| (self.lookup)(id));
        let outcome = render(&mut tree.borrow_mut(), payload.as_ref());
        if let Err(err) = outcome {
            // A failed render must not leave a half-built subtree on display.
            tree.borrow_mut().clear_root()?;
            if let Some(root) = self.roots.borrow_mut().get_mut(&container) {
                root.bound = None;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Tear a container's nested tree down now: destroy its nodes, detach
    /// and release the item box, forget the root.
    fn finalize(&self, container: ContainerId) -> Result<()> {
        let Some(root) = self.roots.borrow_mut().remove(&container) else {
            return Ok(());
        };
        root.tree.borrow_mut().clear_root()?;
        // The toolkit may have dropped the container itself already.
        if let Err(err) = self.env.toolkit.set_container_child(container, None) {
            trace!(?container, ?err, "container already gone");
        }
        self.env.toolkit.release_object(root.item_box)?;
        trace!(?container, "container root finalized");
        Ok(())
    }
}

impl ItemFactory for ItemRenderer {
    fn setup(&self, slot: &DisplayContainer) -> Result<()> {
        let pending = self
            .roots
            .borrow()
            .get(&slot.container)
            .map(|root| root.torn_down)
            .unwrap_or(false);
        if pending {
            // Recycled within the same tick: finish the deferred teardown
            // before building fresh state for this container.
            self.finalize(slot.container)?;
        }
        self.fresh_root(slot.container)?;
        self.render_into(slot.container, None)
    }

    fn bind(&self, slot: &DisplayContainer) -> Result<()> {
        let stale = match self.roots.borrow().get(&slot.container) {
            None => true,
            Some(root) => root.torn_down,
        };
        if stale {
            self.setup(slot)?;
        }
        let (item_box, clear_height) = {
            let mut roots = self.roots.borrow_mut();
            let root = roots
                .get_mut(&slot.container)
                .ok_or_else(|| Error::Render(format!("bind without setup for {:?}", slot.container)))?;
            root.bound = slot.item.clone();
            let clear = !root.height_cleared && self.estimated_height.get().is_some();
            root.height_cleared = true;
            (root.item_box, clear)
        };
        self.render_into(slot.container, slot.item.as_ref())?;
        if clear_height {
            self.env
                .toolkit
                .set_property(item_box, "set_height_request", &PropValue::Int(-1))?;
        }
        Ok(())
    }

    fn unbind(&self, slot: &DisplayContainer) -> Result<()> {
        {
            let mut roots = self.roots.borrow_mut();
            let Some(root) = roots.get_mut(&slot.container) else {
                return Ok(());
            };
            root.bound = None;
        }
        self.render_into(slot.container, None)
    }

    fn teardown(&self, slot: &DisplayContainer) -> Result<()> {
        let container = slot.container;
        {
            let mut roots = self.roots.borrow_mut();
            let Some(root) = roots.get_mut(&container) else {
                return Ok(());
            };
            root.torn_down = true;
            root.bound = None;
        }
        let weak = self.weak.clone();
        self.env.scheduler.defer_teardown(move || {
            let Some(renderer) = weak.upgrade() else {
                return;
            };
            let still_pending = renderer
                .roots
                .borrow()
                .get(&container)
                .map(|root| root.torn_down)
                .unwrap_or(false);
            if still_pending {
                if let Err(err) = renderer.finalize(container) {
                    error!(?container, ?err, "deferred container teardown failed");
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessToolkit;
    use crate::meta::TypeTable;
    use crate::toolkit::Toolkit;
    use crate::node::registry::NodeRegistry;
    use crate::props::Props;

    fn env(toolkit: Rc<HeadlessToolkit>) -> Rc<Env> {
        let types = Rc::new(
            TypeTable::builder()
                .ty("Label")
                .property("label", "set_label", Some("label"))
                .register()
                .build(),
        );
        let registry = Rc::new(NodeRegistry::with_builtins(types.clone()));
        Env::new(toolkit, types, registry)
    }

    fn label_renderer(env: Rc<Env>, payloads: HashMap<ItemId, PropValue>) -> Rc<ItemRenderer> {
        let renderer = ItemRenderer::new(env, move |id| payloads.get(id).cloned());
        renderer.set_render(Some(Rc::new(|tree: &mut BridgeTree, payload: Option<&PropValue>| {
            tree.clear_root()?;
            let text = payload.and_then(|p| p.as_str()).unwrap_or("");
            let label = tree.create_node("Label", Props::new().with("label", text))?;
            tree.append_to_root(label)
        })));
        renderer
    }

    #[test]
    fn test_bind_renders_payload_into_container() {
        let toolkit = Rc::new(HeadlessToolkit::new());
        let env = env(toolkit.clone());
        let mut payloads = HashMap::new();
        payloads.insert(ItemId::from("a"), PropValue::from("first"));
        let renderer = label_renderer(env, payloads);

        let view = toolkit.create_object("ListView", &[]).unwrap();
        toolkit.set_view_factory(view, Some(renderer.clone())).unwrap();
        let container = toolkit.create_container(view).unwrap();

        toolkit.drive_setup(container).unwrap();
        toolkit.drive_bind(container, "a").unwrap();

        let item_box = toolkit.container_child(container).unwrap();
        let label = toolkit.children_of(item_box)[0];
        assert_eq!(toolkit.property(label, "set_label"), Some(PropValue::from("first")));
        assert_eq!(renderer.bound_item(container), Some(ItemId::from("a")));
    }

    #[test]
    fn test_teardown_is_deferred_until_commit_boundary() {
        let toolkit = Rc::new(HeadlessToolkit::new());
        let env = env(toolkit.clone());
        let renderer = label_renderer(env.clone(), HashMap::new());

        let view = toolkit.create_object("ListView", &[]).unwrap();
        toolkit.set_view_factory(view, Some(renderer.clone())).unwrap();
        let container = toolkit.create_container(view).unwrap();
        toolkit.drive_setup(container).unwrap();
        let item_box = toolkit.container_child(container).unwrap();

        toolkit.drive_teardown(container).unwrap();
        // Still alive until the next commit drains teardowns.
        assert!(toolkit.is_alive(item_box));
        assert_eq!(env.scheduler.pending_teardowns(), 1);

        env.scheduler.begin_commit();
        env.scheduler.end_commit();
        assert!(!toolkit.is_alive(item_box));
        assert_eq!(renderer.root_count(), 0);
    }

    #[test]
    fn test_setup_after_teardown_same_tick_reuses_nothing() {
        let toolkit = Rc::new(HeadlessToolkit::new());
        let env = env(toolkit.clone());
        let renderer = label_renderer(env.clone(), HashMap::new());

        let view = toolkit.create_object("ListView", &[]).unwrap();
        toolkit.set_view_factory(view, Some(renderer.clone())).unwrap();
        let container = toolkit.create_container(view).unwrap();
        toolkit.drive_setup(container).unwrap();
        let first_box = toolkit.container_child(container).unwrap();

        toolkit.drive_teardown(container).unwrap();
        // Same container recycled before the deferred teardown ran: setup
        // finalizes the old root first, then builds a fresh one.
        toolkit.drive_setup(container).unwrap();

        let second_box = toolkit.container_child(container).unwrap();
        assert_ne!(first_box, second_box);
        assert!(!toolkit.is_alive(first_box));
        assert!(toolkit.is_alive(second_box));

        // The stale deferred teardown is a no-op against the fresh root.
        env.scheduler.begin_commit();
        env.scheduler.end_commit();
        assert!(toolkit.is_alive(second_box));
        assert_eq!(renderer.root_count(), 1);
    }
}
