//! In-memory reference implementation of the [`Toolkit`] seam.
//!
//! No real widgets: objects are records with property maps, child vectors and
//! connected handlers, plus drive helpers that simulate what a real toolkit
//! does on its own schedule (firing signals, recycling display containers).
//! Useful for tests and for embedders that want a dry-run backend.

use crate::error::{Error, Result};
use crate::props::{ItemId, Key, PropValue, SignalArgs, SignalHandler};
use crate::toolkit::{ContainerId, DisplayContainer, HandlerId, ItemFactory, ObjectId, Toolkit};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Default)]
struct HeadlessObject {
    type_name: String,
    alive: bool,
    construct_args: Vec<(Key, PropValue)>,
    /// Keyed by setter name, mirroring how the bridge writes them.
    properties: HashMap<Key, PropValue>,
    children: Vec<ObjectId>,
    parent: Option<ObjectId>,
    content: Option<ObjectId>,
    controllers: Vec<ObjectId>,
    handlers: Vec<(HandlerId, Key, SignalHandler)>,
    /// Present on objects created through `create_item_model`.
    model_items: Option<Vec<ItemId>>,
    /// (column, row, column_span, row_span) for positioned children.
    positioned: HashMap<ObjectId, (i64, i64, i64, i64)>,
    factory: Option<Rc<dyn ItemFactory>>,
    view_model: Option<ObjectId>,
    selected: Vec<u32>,
}

struct HeadlessContainer {
    view: ObjectId,
    child: Option<ObjectId>,
    bound: Option<ItemId>,
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, HeadlessObject>,
    containers: HashMap<ContainerId, HeadlessContainer>,
    next_object: u64,
    next_handler: u64,
    next_container: u64,
}

#[derive(Default)]
pub struct HeadlessToolkit {
    state: RefCell<State>,
    log: RefCell<Vec<String>>,
    connects: Cell<usize>,
    disconnects: Cell<usize>,
}

impl HeadlessToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    /// All operations recorded so far, oldest first.
    pub fn operations(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.get()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.get()
    }

    fn with_object<R>(&self, obj: ObjectId, f: impl FnOnce(&mut HeadlessObject) -> R) -> Result<R> {
        let mut state = self.state.borrow_mut();
        let record = state.objects.get_mut(&obj).ok_or(Error::DestroyedObject(obj))?;
        if !record.alive {
            return Err(Error::DestroyedObject(obj));
        }
        Ok(f(record))
    }

    fn detach_everywhere(state: &mut State, child: ObjectId) {
        let parent = state.objects.get(&child).and_then(|c| c.parent);
        if let Some(parent) = parent {
            if let Some(record) = state.objects.get_mut(&parent) {
                record.children.retain(|c| *c != child);
                record.positioned.remove(&child);
                if record.content == Some(child) {
                    record.content = None;
                }
            }
        }
        if let Some(record) = state.objects.get_mut(&child) {
            record.parent = None;
        }
    }

    // ------------------------------------------------------------------
    // Inspection helpers for tests.

    pub fn is_alive(&self, obj: ObjectId) -> bool {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|record| record.alive)
            .unwrap_or(false)
    }

    pub fn object_type(&self, obj: ObjectId) -> Option<String> {
        self.state.borrow().objects.get(&obj).map(|record| record.type_name.clone())
    }

    pub fn property(&self, obj: ObjectId, setter: &str) -> Option<PropValue> {
        self.state
            .borrow()
            .objects
            .get(&obj)?
            .properties
            .get(setter)
            .cloned()
    }

    pub fn construct_args(&self, obj: ObjectId) -> Vec<(Key, PropValue)> {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|record| record.construct_args.clone())
            .unwrap_or_default()
    }

    pub fn children_of(&self, obj: ObjectId) -> Vec<ObjectId> {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, obj: ObjectId) -> Option<ObjectId> {
        self.state.borrow().objects.get(&obj)?.parent
    }

    pub fn content_of(&self, obj: ObjectId) -> Option<ObjectId> {
        self.state.borrow().objects.get(&obj)?.content
    }

    pub fn controllers_of(&self, obj: ObjectId) -> Vec<ObjectId> {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|record| record.controllers.clone())
            .unwrap_or_default()
    }

    pub fn position_of(&self, parent: ObjectId, child: ObjectId) -> Option<(i64, i64, i64, i64)> {
        self.state.borrow().objects.get(&parent)?.positioned.get(&child).copied()
    }

    pub fn model_ids(&self, model: ObjectId) -> Vec<ItemId> {
        self.state
            .borrow()
            .objects
            .get(&model)
            .and_then(|record| record.model_items.clone())
            .unwrap_or_default()
    }

    pub fn view_model(&self, view: ObjectId) -> Option<ObjectId> {
        self.state.borrow().objects.get(&view)?.view_model
    }

    pub fn selected_indices(&self, view: ObjectId) -> Vec<u32> {
        self.state
            .borrow()
            .objects
            .get(&view)
            .map(|record| record.selected.clone())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, obj: ObjectId) -> usize {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|record| record.handlers.len())
            .unwrap_or(0)
    }

    pub fn container_child(&self, container: ContainerId) -> Option<ObjectId> {
        self.state.borrow().containers.get(&container)?.child
    }

    pub fn objects_of_type(&self, type_name: &str) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .state
            .borrow()
            .objects
            .iter()
            .filter(|(_, record)| record.alive && record.type_name == type_name)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Drive helpers: what the real toolkit would do on its own.

    /// Fire `signal` on `obj`, invoking every connected handler in
    /// connection order.
    pub fn emit(&self, obj: ObjectId, signal: &str, payload: PropValue) -> Result<()> {
        let handlers: Vec<SignalHandler> = self.with_object(obj, |record| {
            record
                .handlers
                .iter()
                .filter(|(_, name, _)| name == signal)
                .map(|(_, _, handler)| handler.clone())
                .collect()
        })?;

        for handler in handlers {
            handler(&SignalArgs {
                target: obj,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    /// Allocate a fresh recycled display container for `view`.
    pub fn create_container(&self, view: ObjectId) -> Result<ContainerId> {
        self.with_object(view, |_| {})?;
        let mut state = self.state.borrow_mut();
        state.next_container += 1;
        let id = ContainerId(state.next_container);
        state.containers.insert(
            id,
            HeadlessContainer {
                view,
                child: None,
                bound: None,
            },
        );
        Ok(id)
    }

    fn factory_and_slot(&self, container: ContainerId) -> Result<(Rc<dyn ItemFactory>, DisplayContainer)> {
        let state = self.state.borrow();
        let record = state
            .containers
            .get(&container)
            .ok_or(Error::Toolkit(format!("unknown container {container:?}")))?;
        let view = state
            .objects
            .get(&record.view)
            .ok_or(Error::DestroyedObject(record.view))?;
        let factory = view
            .factory
            .clone()
            .ok_or_else(|| Error::Toolkit("view has no factory".into()))?;
        Ok((
            factory,
            DisplayContainer {
                container,
                item: record.bound.clone(),
            },
        ))
    }

    pub fn drive_setup(&self, container: ContainerId) -> Result<()> {
        let (factory, slot) = self.factory_and_slot(container)?;
        trace!(?container, "drive setup");
        factory.setup(&slot)
    }

    pub fn drive_bind(&self, container: ContainerId, id: &str) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            let record = state
                .containers
                .get_mut(&container)
                .ok_or(Error::Toolkit(format!("unknown container {container:?}")))?;
            record.bound = Some(ItemId::from(id));
        }
        let (factory, slot) = self.factory_and_slot(container)?;
        trace!(?container, id, "drive bind");
        factory.bind(&slot)
    }

    pub fn drive_unbind(&self, container: ContainerId) -> Result<()> {
        let (factory, slot) = self.factory_and_slot(container)?;
        let result = factory.unbind(&slot);
        if let Some(record) = self.state.borrow_mut().containers.get_mut(&container) {
            record.bound = None;
        }
        trace!(?container, "drive unbind");
        result
    }

    pub fn drive_teardown(&self, container: ContainerId) -> Result<()> {
        let (factory, slot) = self.factory_and_slot(container)?;
        trace!(?container, "drive teardown");
        let result = factory.teardown(&slot);
        if let Some(record) = self.state.borrow_mut().containers.get_mut(&container) {
            record.bound = None;
        }
        result
    }
}

impl Toolkit for HeadlessToolkit {
    fn create_object(&self, type_name: &str, construct_args: &[(Key, PropValue)]) -> Result<ObjectId> {
        let mut state = self.state.borrow_mut();
        state.next_object += 1;
        let id = ObjectId(state.next_object);
        state.objects.insert(
            id,
            HeadlessObject {
                type_name: type_name.to_string(),
                alive: true,
                construct_args: construct_args.to_vec(),
                ..Default::default()
            },
        );
        drop(state);
        self.log(format!("create {type_name} -> {}", id.0));
        Ok(id)
    }

    fn release_object(&self, obj: ObjectId) -> Result<()> {
        self.with_object(obj, |_| {})?;
        let mut state = self.state.borrow_mut();
        Self::detach_everywhere(&mut state, obj);
        if let Some(record) = state.objects.get_mut(&obj) {
            record.alive = false;
            record.handlers.clear();
        }
        drop(state);
        self.log(format!("release {}", obj.0));
        Ok(())
    }

    fn set_property(&self, obj: ObjectId, setter: &str, value: &PropValue) -> Result<()> {
        self.with_object(obj, |record| {
            record.properties.insert(setter.into(), value.clone());
        })?;
        self.log(format!("set {}.{setter} = {value:?}", obj.0));
        Ok(())
    }

    fn get_property(&self, obj: ObjectId, getter: &str) -> Result<PropValue> {
        self.with_object(obj, |record| {
            record.properties.get(getter).cloned().unwrap_or(PropValue::Null)
        })
    }

    fn connect(&self, obj: ObjectId, signal: &str, handler: SignalHandler) -> Result<HandlerId> {
        let token = {
            let mut state = self.state.borrow_mut();
            state.next_handler += 1;
            let token = HandlerId(state.next_handler);
            let record = state.objects.get_mut(&obj).ok_or(Error::DestroyedObject(obj))?;
            if !record.alive {
                return Err(Error::DestroyedObject(obj));
            }
            record.handlers.push((token, signal.into(), handler));
            token
        };
        self.connects.set(self.connects.get() + 1);
        self.log(format!("connect {}.{signal}", obj.0));
        Ok(token)
    }

    fn disconnect(&self, obj: ObjectId, handler: HandlerId) -> Result<()> {
        self.with_object(obj, |record| {
            record.handlers.retain(|(token, _, _)| *token != handler);
        })?;
        self.disconnects.set(self.disconnects.get() + 1);
        self.log(format!("disconnect {}", obj.0));
        Ok(())
    }

    fn append_child(&self, parent: ObjectId, child: ObjectId) -> Result<()> {
        self.with_object(child, |_| {})?;
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        Self::detach_everywhere(&mut state, child);
        if let Some(record) = state.objects.get_mut(&parent) {
            record.children.push(child);
        }
        if let Some(record) = state.objects.get_mut(&child) {
            record.parent = Some(parent);
        }
        drop(state);
        self.log(format!("append {} -> {}", child.0, parent.0));
        Ok(())
    }

    fn insert_child_before(&self, parent: ObjectId, child: ObjectId, reference: Option<ObjectId>) -> Result<()> {
        self.with_object(child, |_| {})?;
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        Self::detach_everywhere(&mut state, child);
        if let Some(record) = state.objects.get_mut(&parent) {
            let index = reference
                .and_then(|reference| record.children.iter().position(|c| *c == reference))
                .unwrap_or(record.children.len());
            record.children.insert(index, child);
        }
        if let Some(record) = state.objects.get_mut(&child) {
            record.parent = Some(parent);
        }
        drop(state);
        self.log(format!("insert {} -> {} before {:?}", child.0, parent.0, reference.map(|r| r.0)));
        Ok(())
    }

    fn remove_child(&self, parent: ObjectId, child: ObjectId) -> Result<()> {
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        if let Some(record) = state.objects.get_mut(&parent) {
            record.children.retain(|c| *c != child);
            record.positioned.remove(&child);
        }
        if let Some(record) = state.objects.get_mut(&child) {
            if record.parent == Some(parent) {
                record.parent = None;
            }
        }
        drop(state);
        self.log(format!("remove {} from {}", child.0, parent.0));
        Ok(())
    }

    fn set_child(&self, parent: ObjectId, child: Option<ObjectId>) -> Result<()> {
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        let previous = state
            .objects
            .get(&parent)
            .map(|record| record.children.clone())
            .unwrap_or_default();
        for old in previous {
            if Some(old) != child {
                if let Some(record) = state.objects.get_mut(&old) {
                    record.parent = None;
                }
            }
        }
        if let Some(record) = state.objects.get_mut(&parent) {
            record.children.clear();
        }
        if let Some(child) = child {
            Self::detach_everywhere(&mut state, child);
            if let Some(record) = state.objects.get_mut(&parent) {
                record.children.push(child);
            }
            if let Some(record) = state.objects.get_mut(&child) {
                record.parent = Some(parent);
            }
        }
        drop(state);
        self.log(format!("set_child {} = {:?}", parent.0, child.map(|c| c.0)));
        Ok(())
    }

    fn set_content(&self, parent: ObjectId, child: Option<ObjectId>) -> Result<()> {
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        let old = state.objects.get(&parent).and_then(|record| record.content);
        if let Some(old) = old {
            if Some(old) != child {
                if let Some(record) = state.objects.get_mut(&old) {
                    record.parent = None;
                }
            }
        }
        if let Some(child) = child {
            Self::detach_everywhere(&mut state, child);
            if let Some(record) = state.objects.get_mut(&child) {
                record.parent = Some(parent);
            }
        }
        if let Some(record) = state.objects.get_mut(&parent) {
            record.content = child;
        }
        drop(state);
        self.log(format!("set_content {} = {:?}", parent.0, child.map(|c| c.0)));
        Ok(())
    }

    fn attach_at(
        &self,
        parent: ObjectId,
        child: ObjectId,
        column: i64,
        row: i64,
        column_span: i64,
        row_span: i64,
    ) -> Result<()> {
        self.with_object(child, |_| {})?;
        self.with_object(parent, |_| {})?;
        let mut state = self.state.borrow_mut();
        Self::detach_everywhere(&mut state, child);
        if let Some(record) = state.objects.get_mut(&parent) {
            record.children.push(child);
            record.positioned.insert(child, (column, row, column_span, row_span));
        }
        if let Some(record) = state.objects.get_mut(&child) {
            record.parent = Some(parent);
        }
        drop(state);
        self.log(format!("attach {} -> {} at {column},{row}", child.0, parent.0));
        Ok(())
    }

    fn child_parent(&self, child: ObjectId) -> Result<Option<ObjectId>> {
        self.with_object(child, |record| record.parent)
    }

    fn add_controller(&self, widget: ObjectId, controller: ObjectId) -> Result<()> {
        self.with_object(controller, |_| {})?;
        self.with_object(widget, |record| record.controllers.push(controller))?;
        self.log(format!("add_controller {} -> {}", controller.0, widget.0));
        Ok(())
    }

    fn remove_controller(&self, widget: ObjectId, controller: ObjectId) -> Result<()> {
        self.with_object(widget, |record| {
            record.controllers.retain(|c| *c != controller);
        })?;
        self.log(format!("remove_controller {} from {}", controller.0, widget.0));
        Ok(())
    }

    fn create_item_model(&self) -> Result<ObjectId> {
        let id = self.create_object("ItemModel", &[])?;
        self.with_object(id, |record| record.model_items = Some(Vec::new()))?;
        Ok(id)
    }

    fn model_append(&self, model: ObjectId, id: &str) -> Result<()> {
        self.with_object(model, |record| {
            if let Some(items) = record.model_items.as_mut() {
                items.push(id.into());
            }
        })?;
        self.log(format!("model_append {} '{id}'", model.0));
        Ok(())
    }

    fn model_insert(&self, model: ObjectId, index: usize, id: &str) -> Result<()> {
        self.with_object(model, |record| {
            if let Some(items) = record.model_items.as_mut() {
                let index = index.min(items.len());
                items.insert(index, id.into());
            }
        })?;
        self.log(format!("model_insert {} [{index}] '{id}'", model.0));
        Ok(())
    }

    fn model_remove(&self, model: ObjectId, index: usize) -> Result<()> {
        self.with_object(model, |record| {
            if let Some(items) = record.model_items.as_mut() {
                if index < items.len() {
                    items.remove(index);
                }
            }
        })?;
        self.log(format!("model_remove {} [{index}]", model.0));
        Ok(())
    }

    fn model_len(&self, model: ObjectId) -> Result<usize> {
        self.with_object(model, |record| {
            record.model_items.as_ref().map(|items| items.len()).unwrap_or(0)
        })
    }

    fn set_view_factory(&self, view: ObjectId, factory: Option<Rc<dyn ItemFactory>>) -> Result<()> {
        self.with_object(view, |record| record.factory = factory)?;
        self.log(format!("set_view_factory {}", view.0));
        Ok(())
    }

    fn set_view_model(&self, view: ObjectId, model: Option<ObjectId>) -> Result<()> {
        self.with_object(view, |record| record.view_model = model)?;
        self.log(format!("set_view_model {} = {:?}", view.0, model.map(|m| m.0)));
        Ok(())
    }

    fn set_view_selected(&self, view: ObjectId, indices: &[u32]) -> Result<()> {
        self.with_object(view, |record| record.selected = indices.to_vec())?;
        self.log(format!("set_view_selected {} = {:?}", view.0, indices));
        // A real toolkit notifies its selection model; mirror that.
        self.emit(view, "selection_changed", PropValue::Indices(indices.to_vec()))
    }

    fn create_item_container(&self) -> Result<ObjectId> {
        self.create_object("ItemContainer", &[])
    }

    fn set_container_child(&self, container: ContainerId, child: Option<ObjectId>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let record = state
            .containers
            .get_mut(&container)
            .ok_or(Error::Toolkit(format!("unknown container {container:?}")))?;
        record.child = child;
        drop(state);
        self.log(format!("set_container_child {:?} = {:?}", container.0, child.map(|c| c.0)));
        Ok(())
    }
}
