//! Flat id-keyed item store mirrored into a native list model.
//!
//! The store is the single source of truth for item order and payloads. The
//! native model only ever sees ids; display payloads stay on this side and
//! are resolved by the renderer at bind time. An id→index map is kept in
//! lockstep and re-stamped from the mutation point whenever items shift.

use crate::error::Result;
use crate::props::{ItemId, PropValue};
use crate::toolkit::{ObjectId, Toolkit};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

pub struct ItemStore {
    toolkit: Rc<dyn Toolkit>,
    model: ObjectId,
    ids: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
    payloads: HashMap<ItemId, PropValue>,
    on_updated: Option<Rc<dyn Fn(&ItemId)>>,
    released: bool,
}

impl ItemStore {
    pub fn new(toolkit: Rc<dyn Toolkit>) -> Result<Self> {
        let model = toolkit.create_item_model()?;
        Ok(Self {
            toolkit,
            model,
            ids: Vec::new(),
            index: HashMap::new(),
            payloads: HashMap::new(),
            on_updated: None,
            released: false,
        })
    }

    pub fn model(&self) -> ObjectId {
        self.model
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        self.ids.get(index).cloned()
    }

    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn payload(&self, id: &str) -> Option<PropValue> {
        self.payloads.get(id).cloned()
    }

    /// Invoked after an in-place payload update so displayed items can be
    /// re-bound.
    pub fn set_on_updated(&mut self, callback: Option<Rc<dyn Fn(&ItemId)>>) {
        self.on_updated = callback;
    }

    /// Append `id`. An id already present becomes an in-place update
    /// instead.
    pub fn append(&mut self, id: ItemId, payload: PropValue) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if self.contains(&id) {
            return self.update(&id, payload);
        }
        self.toolkit.model_append(self.model, &id)?;
        self.index.insert(id.clone(), self.ids.len());
        self.payloads.insert(id.clone(), payload);
        self.ids.push(id);
        Ok(())
    }

    /// Insert `id` ahead of `reference`. A missing reference degrades to an
    /// append; an id already present becomes an update.
    pub fn insert_before(
        &mut self,
        id: ItemId,
        payload: PropValue,
        reference: Option<&str>,
    ) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if self.contains(&id) {
            return self.update(&id, payload);
        }
        let position = reference.and_then(|r| self.index_of(r));
        if reference.is_some() && position.is_none() {
            warn!(%id, "insert reference not in store, appending");
        }
        let Some(position) = position else {
            return self.append(id, payload);
        };
        self.toolkit.model_insert(self.model, position, &id)?;
        self.ids.insert(position, id.clone());
        self.payloads.insert(id, payload);
        self.restamp_from(position);
        Ok(())
    }

    /// Replace the payload for `id`. An unknown id degrades to an append so
    /// out-of-order commits converge.
    pub fn update(&mut self, id: &str, payload: PropValue) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if !self.contains(id) {
            return self.append(ItemId::from(id), payload);
        }
        self.payloads.insert(ItemId::from(id), payload);
        if let Some(callback) = self.on_updated.clone() {
            callback(&ItemId::from(id));
        }
        Ok(())
    }

    /// Remove `id`, returning the index it occupied. Unknown ids are a
    /// no-op.
    pub fn remove(&mut self, id: &str) -> Result<Option<usize>> {
        if self.released {
            return Ok(None);
        }
        let Some(position) = self.index.remove(id) else {
            return Ok(None);
        };
        self.toolkit.model_remove(self.model, position)?;
        self.ids.remove(position);
        self.payloads.remove(id);
        self.restamp_from(position);
        Ok(Some(position))
    }

    /// Release the native model. Later mutations become no-ops so that
    /// deferred work landing after the owning view is gone stays harmless.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.toolkit.release_object(self.model)
    }

    fn restamp_from(&mut self, position: usize) {
        for (offset, id) in self.ids[position..].iter().enumerate() {
            self.index.insert(id.clone(), position + offset);
        }
    }
}
