//! Id-based selection, projected onto native index sets on demand.
//!
//! Ids are authoritative: indices are derived against the current item
//! order whenever the native side needs them, so reorders and removals
//! never leave the selection pointing at the wrong rows.

use crate::props::ItemId;
use std::collections::BTreeSet;

#[derive(Default)]
pub struct SelectionState {
    ids: BTreeSet<ItemId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ids(&mut self, ids: &[ItemId]) {
        self.ids = ids.iter().cloned().collect();
    }

    pub fn select(&mut self, id: ItemId) -> bool {
        self.ids.insert(id)
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.ids.iter().cloned().collect()
    }

    /// Project onto native indices. Ids the lookup no longer knows are
    /// silently skipped; the result is sorted.
    pub fn indices_for(&self, lookup: impl Fn(&ItemId) -> Option<usize>) -> Vec<u32> {
        let mut indices: Vec<u32> = self.ids.iter().filter_map(|id| lookup(id)).map(|i| i as u32).collect();
        indices.sort_unstable();
        indices
    }

    /// Drop ids the lookup no longer resolves. Returns whether anything was
    /// dropped.
    pub fn retain_known(&mut self, lookup: impl Fn(&ItemId) -> Option<usize>) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| lookup(id).is_some());
        self.ids.len() != before
    }

    /// Replace the selection from a native index set.
    pub fn set_from_indices(&mut self, indices: &[u32], id_at: impl Fn(usize) -> Option<ItemId>) {
        self.ids = indices.iter().filter_map(|i| id_at(*i as usize)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order<'a>(ids: &'a [&'a str]) -> impl Fn(&ItemId) -> Option<usize> + 'a {
        move |id: &ItemId| ids.iter().position(|known| *known == id.as_str())
    }

    #[test]
    fn test_indices_follow_item_order() {
        let mut selection = SelectionState::new();
        selection.set_ids(&["b".into(), "d".into()]);

        assert_eq!(selection.indices_for(order(&["a", "b", "c", "d"])), vec![1, 3]);
        // Same ids, new order.
        assert_eq!(selection.indices_for(order(&["d", "c", "b", "a"])), vec![0, 2]);
    }

    #[test]
    fn test_unknown_ids_are_skipped_not_dropped() {
        let mut selection = SelectionState::new();
        selection.set_ids(&["a".into(), "gone".into()]);

        assert_eq!(selection.indices_for(order(&["a", "b"])), vec![0]);
        // The id is still selected; it just has no index right now.
        assert!(selection.contains("gone"));

        assert!(selection.retain_known(order(&["a", "b"])));
        assert!(!selection.contains("gone"));
    }

    #[test]
    fn test_set_from_indices_resolves_ids() {
        let ids = ["a", "b", "c"];
        let mut selection = SelectionState::new();
        selection.set_from_indices(&[0, 2], |i| ids.get(i).map(|s| ItemId::from(*s)));

        assert_eq!(selection.ids(), vec![ItemId::from("a"), ItemId::from("c")]);
    }
}
