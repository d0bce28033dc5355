//! Virtualized collection support: id-keyed item stores mirrored into
//! native list models, a recycling item renderer, and the view behaviors
//! that tie them to collection widgets.

pub mod renderer;
pub mod selection;
pub mod store;
pub mod tree_store;
pub mod view;

use crate::error::{Error, Result};
use crate::props::{ItemId, PropValue};
use crate::scheduler::DeferredAction;
use crate::toolkit::ObjectId;
use renderer::ItemRenderer;
use std::cell::RefCell;
use std::rc::Rc;
use store::ItemStore;
use tree_store::TreeItemStore;

/// Uniform access to a flat or hierarchical item store, for item nodes that
/// forward their mutations without caring which one their view hosts.
#[derive(Clone)]
pub enum StoreHandle {
    Flat(Rc<RefCell<ItemStore>>),
    Tree(Rc<RefCell<TreeItemStore>>),
}

impl StoreHandle {
    /// The model collection views hand to the toolkit.
    pub fn model(&self) -> ObjectId {
        match self {
            StoreHandle::Flat(store) => store.borrow().model(),
            StoreHandle::Tree(store) => store.borrow().root_model(),
        }
    }

    pub fn append(&self, parent: Option<&ItemId>, id: &ItemId, payload: PropValue) -> Result<()> {
        match self {
            StoreHandle::Flat(store) => {
                reject_nesting(parent)?;
                store.borrow_mut().append(id.clone(), payload)
            }
            StoreHandle::Tree(store) => {
                store.borrow_mut().append(parent.map(|p| p.as_str()), id.clone(), payload)
            }
        }
    }

    pub fn insert_before(
        &self,
        parent: Option<&ItemId>,
        id: &ItemId,
        payload: PropValue,
        reference: Option<&ItemId>,
    ) -> Result<()> {
        match self {
            StoreHandle::Flat(store) => {
                reject_nesting(parent)?;
                store
                    .borrow_mut()
                    .insert_before(id.clone(), payload, reference.map(|r| r.as_str()))
            }
            StoreHandle::Tree(store) => store.borrow_mut().insert_before(
                parent.map(|p| p.as_str()),
                id.clone(),
                payload,
                reference.map(|r| r.as_str()),
            ),
        }
    }

    pub fn update(&self, id: &ItemId, payload: PropValue) -> Result<()> {
        match self {
            StoreHandle::Flat(store) => store.borrow_mut().update(id, payload),
            StoreHandle::Tree(store) => store.borrow_mut().update(id, payload),
        }
    }

    pub fn remove(&self, id: &ItemId) -> Result<()> {
        match self {
            StoreHandle::Flat(store) => store.borrow_mut().remove(id).map(|_| ()),
            StoreHandle::Tree(store) => store.borrow_mut().remove(id),
        }
    }

    pub fn payload(&self, id: &ItemId) -> Option<PropValue> {
        match self {
            StoreHandle::Flat(store) => store.borrow().payload(id),
            StoreHandle::Tree(store) => store.borrow().payload(id),
        }
    }

    /// Position of `id` within the model the view displays (top level for
    /// hierarchical stores).
    pub fn index_of(&self, id: &ItemId) -> Option<usize> {
        match self {
            StoreHandle::Flat(store) => store.borrow().index_of(id),
            StoreHandle::Tree(store) => store.borrow().root_index_of(id),
        }
    }

    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        match self {
            StoreHandle::Flat(store) => store.borrow().id_at(index),
            StoreHandle::Tree(store) => store.borrow().root_id_at(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StoreHandle::Flat(store) => store.borrow().len(),
            StoreHandle::Tree(store) => store.borrow().root_len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_on_updated(&self, callback: Option<Rc<dyn Fn(&ItemId)>>) {
        match self {
            StoreHandle::Flat(store) => store.borrow_mut().set_on_updated(callback),
            StoreHandle::Tree(store) => store.borrow_mut().set_on_updated(callback),
        }
    }

    /// Release every native model owned by the store.
    pub fn release(&self) -> Result<()> {
        match self {
            StoreHandle::Flat(store) => store.borrow_mut().release(),
            StoreHandle::Tree(store) => store.borrow_mut().release(),
        }
    }
}

fn reject_nesting(parent: Option<&ItemId>) -> Result<()> {
    match parent {
        None => Ok(()),
        Some(parent) => Err(Error::InvalidChild {
            child: format!("item under '{parent}'"),
            parent: "flat collection view".into(),
        }),
    }
}

/// What a collection view exposes to its item children: the store they
/// mutate, the renderer that may be displaying them, and the coalesced
/// selection re-push that runs after removals.
#[derive(Clone)]
pub struct CollectionHandles {
    pub store: StoreHandle,
    pub renderer: Rc<ItemRenderer>,
    pub selection_refresh: DeferredAction,
}
