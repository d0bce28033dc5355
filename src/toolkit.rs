//! The native-toolkit seam.
//!
//! Everything the bridge needs from the underlying widget toolkit is behind
//! [`Toolkit`]: object construction, property access, event subscription with
//! disposable handles, parent/child attachment in its named-slot and
//! positioned variants, the list-model primitive, and the recycling view
//! that drives [`ItemFactory`] callbacks. All calls happen on the toolkit's
//! event-loop thread; implementations are not required to be `Send`.

use crate::error::Result;
use crate::props::{ItemId, Key, PropValue, SignalHandler};
use std::rc::Rc;

/// Opaque handle of a native toolkit object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Disposable token returned by [`Toolkit::connect`]; releasing it is the
/// only way to undo a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Native-assigned identity of a recycled display container. Containers are
/// reused across different logical items, so this is distinct from [`ItemId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u64);

/// A recycled display container as seen by a factory callback: its identity
/// plus the logical item it is currently bound to, if any.
#[derive(Debug, Clone)]
pub struct DisplayContainer {
    pub container: ContainerId,
    pub item: Option<ItemId>,
}

/// The four structural callbacks a recycling list/grid/tree view fires.
/// Invocation order is the toolkit's to decide; implementations must be
/// correct under any legal interleaving.
pub trait ItemFactory {
    fn setup(&self, slot: &DisplayContainer) -> Result<()>;
    fn bind(&self, slot: &DisplayContainer) -> Result<()>;
    fn unbind(&self, slot: &DisplayContainer) -> Result<()>;
    fn teardown(&self, slot: &DisplayContainer) -> Result<()>;
}

pub trait Toolkit {
    // Object lifetime.
    fn create_object(&self, type_name: &str, construct_args: &[(Key, PropValue)]) -> Result<ObjectId>;
    fn release_object(&self, obj: ObjectId) -> Result<()>;

    // Properties.
    fn set_property(&self, obj: ObjectId, setter: &str, value: &PropValue) -> Result<()>;
    fn get_property(&self, obj: ObjectId, getter: &str) -> Result<PropValue>;

    // Event subscription.
    fn connect(&self, obj: ObjectId, signal: &str, handler: SignalHandler) -> Result<HandlerId>;
    fn disconnect(&self, obj: ObjectId, handler: HandlerId) -> Result<()>;

    // Parent/child attachment.
    fn append_child(&self, parent: ObjectId, child: ObjectId) -> Result<()>;
    fn insert_child_before(&self, parent: ObjectId, child: ObjectId, reference: Option<ObjectId>) -> Result<()>;
    fn remove_child(&self, parent: ObjectId, child: ObjectId) -> Result<()>;
    fn set_child(&self, parent: ObjectId, child: Option<ObjectId>) -> Result<()>;
    fn set_content(&self, parent: ObjectId, child: Option<ObjectId>) -> Result<()>;
    fn attach_at(
        &self,
        parent: ObjectId,
        child: ObjectId,
        column: i64,
        row: i64,
        column_span: i64,
        row_span: i64,
    ) -> Result<()>;
    /// The child's current native parent, if it is attached anywhere.
    fn child_parent(&self, child: ObjectId) -> Result<Option<ObjectId>>;

    // Event controllers.
    fn add_controller(&self, widget: ObjectId, controller: ObjectId) -> Result<()>;
    fn remove_controller(&self, widget: ObjectId, controller: ObjectId) -> Result<()>;

    // List-model primitive backing virtualized views.
    fn create_item_model(&self) -> Result<ObjectId>;
    fn model_append(&self, model: ObjectId, id: &str) -> Result<()>;
    fn model_insert(&self, model: ObjectId, index: usize, id: &str) -> Result<()>;
    fn model_remove(&self, model: ObjectId, index: usize) -> Result<()>;
    fn model_len(&self, model: ObjectId) -> Result<usize>;

    // Recycling views.
    fn set_view_factory(&self, view: ObjectId, factory: Option<Rc<dyn ItemFactory>>) -> Result<()>;
    fn set_view_model(&self, view: ObjectId, model: Option<ObjectId>) -> Result<()>;
    /// Push a selection as native indices. Delivery of the resulting
    /// "selection_changed" signal is the toolkit's business; callers block
    /// signals around this to avoid looping back into the driver.
    fn set_view_selected(&self, view: ObjectId, indices: &[u32]) -> Result<()>;

    /// Fresh content widget for a recycled display container.
    fn create_item_container(&self) -> Result<ObjectId>;
    fn set_container_child(&self, container: ContainerId, child: Option<ObjectId>) -> Result<()>;
}
