//! Hierarchical id-keyed store: one sibling list per parent, with child
//! models created lazily on first descendant and torn down when the last
//! child under a parent goes away.

use crate::error::Result;
use crate::props::{ItemId, PropValue};
use crate::toolkit::{ObjectId, Toolkit};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

#[derive(Default)]
struct Branch {
    model: Option<ObjectId>,
    ids: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
}

impl Branch {
    fn restamp_from(&mut self, position: usize) {
        for (offset, id) in self.ids[position..].iter().enumerate() {
            self.index.insert(id.clone(), position + offset);
        }
    }
}

pub struct TreeItemStore {
    toolkit: Rc<dyn Toolkit>,
    /// Root model handle, kept for the store's lifetime; `released` gates
    /// any use after release.
    root_model: ObjectId,
    root: Branch,
    /// Children of an item, keyed by its id. Absent means no children yet.
    branches: HashMap<ItemId, Branch>,
    /// Parent id for every known item; `None` for top-level items.
    parents: HashMap<ItemId, Option<ItemId>>,
    payloads: HashMap<ItemId, PropValue>,
    on_updated: Option<Rc<dyn Fn(&ItemId)>>,
    released: bool,
}

impl TreeItemStore {
    pub fn new(toolkit: Rc<dyn Toolkit>) -> Result<Self> {
        let root_model = toolkit.create_item_model()?;
        Ok(Self {
            toolkit,
            root_model,
            root: Branch {
                model: Some(root_model),
                ..Default::default()
            },
            branches: HashMap::new(),
            parents: HashMap::new(),
            payloads: HashMap::new(),
            on_updated: None,
            released: false,
        })
    }

    pub fn root_model(&self) -> ObjectId {
        self.root_model
    }

    pub fn root_len(&self) -> usize {
        self.root.ids.len()
    }

    pub fn root_index_of(&self, id: &str) -> Option<usize> {
        self.root.index.get(id).copied()
    }

    pub fn root_id_at(&self, index: usize) -> Option<ItemId> {
        self.root.ids.get(index).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    pub fn payload(&self, id: &str) -> Option<PropValue> {
        self.payloads.get(id).cloned()
    }

    pub fn parent_of(&self, id: &str) -> Option<ItemId> {
        self.parents.get(id).cloned().flatten()
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.branches.get(id).map(|branch| !branch.ids.is_empty()).unwrap_or(false)
    }

    pub fn children_of(&self, id: &str) -> Vec<ItemId> {
        self.branches.get(id).map(|branch| branch.ids.clone()).unwrap_or_default()
    }

    /// The branch model for `id`'s children, created on first request.
    pub fn child_model(&mut self, id: &str) -> Result<ObjectId> {
        let branch = self.branches.entry(ItemId::from(id)).or_default();
        match branch.model {
            Some(model) => Ok(model),
            None => {
                let model = self.toolkit.create_item_model()?;
                branch.model = Some(model);
                Ok(model)
            }
        }
    }

    pub fn set_on_updated(&mut self, callback: Option<Rc<dyn Fn(&ItemId)>>) {
        self.on_updated = callback;
    }

    pub fn append(&mut self, parent: Option<&str>, id: ItemId, payload: PropValue) -> Result<()> {
        self.insert_before(parent, id, payload, None)
    }

    pub fn insert_before(
        &mut self,
        parent: Option<&str>,
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
        let parent_id = parent.map(ItemId::from);
        if let Some(parent_id) = &parent_id {
            // Materialize the branch model before the first child lands.
            self.child_model(parent_id)?;
        }
        let toolkit = self.toolkit.clone();
        let branch = self.branch_mut(parent_id.as_deref());
        let model = branch.model;

        let position = reference.and_then(|r| branch.index.get(r).copied());
        if reference.is_some() && position.is_none() {
            warn!(%id, "insert reference not among siblings, appending");
        }
        let position = position.unwrap_or(branch.ids.len());
        if let Some(model) = model {
            toolkit.model_insert(model, position, &id)?;
        }
        branch.ids.insert(position, id.clone());
        branch.restamp_from(position);

        self.parents.insert(id.clone(), parent_id);
        self.payloads.insert(id, payload);
        Ok(())
    }

    pub fn update(&mut self, id: &str, payload: PropValue) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if !self.contains(id) {
            return self.append(None, ItemId::from(id), payload);
        }
        self.payloads.insert(ItemId::from(id), payload);
        if let Some(callback) = self.on_updated.clone() {
            callback(&ItemId::from(id));
        }
        Ok(())
    }

    /// Remove `id` and its entire subtree. When the parent's branch empties,
    /// its model is released.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let Some(parent) = self.parents.remove(id) else {
            return Ok(());
        };
        for child in self.children_of(id) {
            self.remove(&child)?;
        }
        if let Some(branch) = self.branches.remove(id) {
            if let Some(model) = branch.model {
                self.toolkit.release_object(model)?;
            }
        }
        self.payloads.remove(id);

        let toolkit = self.toolkit.clone();
        let branch = self.branch_mut(parent.as_deref());
        if let Some(position) = branch.index.remove(id) {
            if let Some(model) = branch.model {
                toolkit.model_remove(model, position)?;
            }
            branch.ids.remove(position);
            branch.restamp_from(position);
        }

        // A now-empty non-root branch no longer needs its model.
        if let Some(parent_id) = parent {
            let emptied = self
                .branches
                .get(&parent_id)
                .map(|branch| branch.ids.is_empty())
                .unwrap_or(false);
            if emptied {
                if let Some(branch) = self.branches.remove(&parent_id) {
                    if let Some(model) = branch.model {
                        self.toolkit.release_object(model)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Release every branch model and the root model. Later mutations
    /// become no-ops.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        for (_, branch) in self.branches.drain() {
            if let Some(model) = branch.model {
                self.toolkit.release_object(model)?;
            }
        }
        if let Some(model) = self.root.model.take() {
            self.toolkit.release_object(model)?;
        }
        Ok(())
    }

    fn branch_mut(&mut self, parent: Option<&str>) -> &mut Branch {
        match parent {
            None => &mut self.root,
            Some(parent) => self.branches.entry(ItemId::from(parent)).or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessToolkit;

    fn store() -> (Rc<HeadlessToolkit>, TreeItemStore) {
        let toolkit = Rc::new(HeadlessToolkit::new());
        let store = TreeItemStore::new(toolkit.clone()).unwrap();
        (toolkit, store)
    }

    #[test]
    fn test_child_model_is_created_lazily() {
        let (toolkit, mut store) = store();
        store.append(None, "a".into(), PropValue::Null).unwrap();
        assert_eq!(toolkit.objects_of_type("ItemModel").len(), 1);

        store.append(Some("a"), "a1".into(), PropValue::Null).unwrap();
        assert_eq!(toolkit.objects_of_type("ItemModel").len(), 2);

        let child_model = store.child_model("a").unwrap();
        assert_eq!(toolkit.model_ids(child_model), vec!["a1"]);
        assert_eq!(toolkit.model_ids(store.root_model()), vec!["a"]);
    }

    #[test]
    fn test_sibling_order_per_parent() {
        let (_, mut store) = store();
        store.append(None, "a".into(), PropValue::Null).unwrap();
        store.append(Some("a"), "a1".into(), PropValue::Null).unwrap();
        store.append(Some("a"), "a3".into(), PropValue::Null).unwrap();
        store
            .insert_before(Some("a"), "a2".into(), PropValue::Null, Some("a3"))
            .unwrap();

        assert_eq!(store.children_of("a"), vec!["a1", "a2", "a3"]);
        assert_eq!(store.root_index_of("a"), Some(0));
    }

    #[test]
    fn test_removing_subtree_releases_emptied_branch_model() {
        let (toolkit, mut store) = store();
        store.append(None, "a".into(), PropValue::Null).unwrap();
        store.append(Some("a"), "a1".into(), PropValue::Null).unwrap();
        store.append(Some("a1"), "deep".into(), PropValue::Null).unwrap();
        assert_eq!(toolkit.objects_of_type("ItemModel").len(), 3);

        store.remove("a1").unwrap();

        assert!(!store.contains("a1"));
        assert!(!store.contains("deep"));
        assert!(!store.has_children("a"));
        // Only the root model survives.
        assert_eq!(toolkit.objects_of_type("ItemModel").len(), 1);
    }

    #[test]
    fn test_release_keeps_the_root_handle_and_drops_mutations() {
        let (toolkit, mut store) = store();
        store.append(None, "a".into(), PropValue::Null).unwrap();
        let root_model = store.root_model();

        store.release().unwrap();

        assert!(!toolkit.is_alive(root_model));
        assert_eq!(store.root_model(), root_model);
        store.append(None, "b".into(), PropValue::Null).unwrap();
        assert!(!store.contains("b"));
    }
}
