//! Tracked list property. Every structural change marks the list's node dirty, which in
//! turn dirties the owning document.

use super::node::TrackedNode;
use super::proxy::{Property, Slot, relink};
use crate::errors::N1qlError;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

struct ListInner {
    node: Arc<TrackedNode>,
    items: RwLock<Vec<Slot>>,
}

/// Non-owning handle to a list.
#[derive(Clone)]
pub(crate) struct WeakList(Weak<ListInner>);

impl WeakList {
    pub(crate) fn upgrade(&self) -> Option<TrackedList> {
        self.0.upgrade().map(|inner| TrackedList { inner })
    }
}

#[derive(Clone)]
pub struct TrackedList {
    inner: Arc<ListInner>,
}

impl std::fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedList").field("node", &self.inner.node).field("len", &self.len()).finish()
    }
}

impl Default for TrackedList {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedList {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(ListInner { node: TrackedNode::new(), items: RwLock::new(Vec::new()) }) }
    }

    pub(crate) fn materialize(items: Vec<Value>) -> Self {
        let list = Self::new();
        list.node().begin_deserializing();
        for v in items {
            list.push(Property::from_json(v));
        }
        list.node().clear_status();
        list
    }

    #[must_use]
    pub fn node(&self) -> &Arc<TrackedNode> {
        &self.inner.node
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakList {
        WeakList(Arc::downgrade(&self.inner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Element `index`; a dropped back-reference reads as null.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Property> {
        self.inner.items.read().get(index).map(Slot::get_or_null)
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn items(&self) -> Vec<Property> {
        self.inner.items.read().iter().map(Slot::get_or_null).collect()
    }

    pub fn push(&self, item: impl Into<Property>) {
        let item = item.into();
        let slot = Slot::hold(&self.inner.node, item.clone());
        self.inner.items.write().push(slot);
        relink(&self.inner.node, None, Some(&item));
        self.inner.node.document_modified();
    }

    /// # Errors
    /// `UnexpectedResult` if `index > len`.
    pub fn insert(&self, index: usize, item: impl Into<Property>) -> Result<(), N1qlError> {
        let item = item.into();
        let slot = Slot::hold(&self.inner.node, item.clone());
        {
            let mut items = self.inner.items.write();
            if index > items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.insert(index, slot);
        }
        relink(&self.inner.node, None, Some(&item));
        self.inner.node.document_modified();
        Ok(())
    }

    /// Replace element `index`. Assigning the same element is not a change.
    ///
    /// # Errors
    /// `UnexpectedResult` if `index` is out of range.
    pub fn set(&self, index: usize, item: impl Into<Property>) -> Result<bool, N1qlError> {
        let item = item.into();
        let new_slot = Slot::hold(&self.inner.node, item.clone());
        let old = {
            let mut items = self.inner.items.write();
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            if slot.get_or_null().same_as(&item) {
                return Ok(false);
            }
            std::mem::replace(slot, new_slot).get_or_null()
        };
        self.unlink_if_absent(&old);
        relink(&self.inner.node, None, Some(&item));
        self.inner.node.document_modified();
        Ok(true)
    }

    pub fn remove(&self, index: usize) -> Option<Property> {
        let old = {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index).get_or_null()
        };
        self.unlink_if_absent(&old);
        self.inner.node.document_modified();
        Some(old)
    }

    /// Clearing an empty list is not a change.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.inner.items.write());
        if old.is_empty() {
            return;
        }
        for p in old.iter().filter_map(Slot::get) {
            relink(&self.inner.node, Some(&p), None);
        }
        self.inner.node.document_modified();
    }

    // The same sub-document may appear more than once; keep the link while any copy remains.
    fn unlink_if_absent(&self, old: &Property) {
        let still_present = self.inner.items.read().iter().any(|s| s.get().is_some_and(|p| p.same_as(old)));
        if !still_present {
            relink(&self.inner.node, Some(old), None);
        }
    }

    /// # Errors
    /// `UnexpectedResult` when an element contains the list.
    pub fn to_json(&self) -> Result<Value, N1qlError> {
        self.to_json_guarded(&mut HashSet::new())
    }

    pub(crate) fn to_json_guarded(&self, path: &mut HashSet<usize>) -> Result<Value, N1qlError> {
        let id = Arc::as_ptr(&self.inner) as usize;
        if !path.insert(id) {
            return Err(N1qlError::UnexpectedResult("cyclic document graph".into()));
        }
        let items = self.items();
        let mut out = Vec::with_capacity(items.len());
        for p in &items {
            out.push(p.to_json_guarded(path)?);
        }
        path.remove(&id);
        Ok(Value::Array(out))
    }
}

fn out_of_range(index: usize, len: usize) -> N1qlError {
    N1qlError::UnexpectedResult(format!("index {index} out of range for list of length {len}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackedDocument;
    use serde_json::json;

    fn order() -> TrackedDocument {
        TrackedDocument::from_json(json!({
            "id": "order_1",
            "lines": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 2}]
        }))
        .unwrap()
    }

    #[test]
    fn element_mutation_dirties_owner() {
        let o = order();
        let lines = o.get_list("lines").unwrap();
        let Some(Property::Document(first)) = lines.get(0) else { panic!("expected a sub-document") };
        first.set_value("qty", json!(3));
        assert!(o.is_dirty());
        assert!(o.node().is_effectively_dirty());
        o.node().clear_status();
        assert!(!o.is_dirty() && !lines.node().is_dirty() && !first.is_dirty());
    }

    #[test]
    fn structural_changes_dirty_owner() {
        let o = order();
        let lines = o.get_list("lines").unwrap();
        lines.push(json!({"sku": "c", "qty": 1}));
        assert!(o.is_dirty());
        o.node().clear_status();

        let removed = lines.remove(0).unwrap();
        assert!(o.is_dirty());
        o.node().clear_status();
        // removed element no longer reaches the owner
        if let Property::Document(d) = removed {
            d.set_value("qty", json!(9));
        }
        assert!(!o.is_dirty());

        lines.clear();
        assert!(o.is_dirty());
        o.node().clear_status();
        lines.clear();
        assert!(!o.is_dirty());
    }

    #[test]
    fn list_holding_its_owner_does_not_leak() {
        let o = order();
        let lines = o.get_list("lines").unwrap();
        lines.push(o.clone());
        let Some(Property::Document(back)) = lines.get(2) else { panic!("expected the owner") };
        assert!(back.ptr_eq(&o));
        drop(back);
        let node = Arc::downgrade(o.node());
        drop(o);
        assert!(node.upgrade().is_none());
        assert!(matches!(lines.get(2), Some(Property::Value(Value::Null))));
    }

    #[test]
    fn set_and_insert_bounds() {
        let o = order();
        let lines = o.get_list("lines").unwrap();
        assert!(lines.set(5, json!(1)).is_err());
        assert!(lines.insert(5, json!(1)).is_err());
        let same = lines.get(1).unwrap();
        assert!(!lines.set(1, same).unwrap());
        assert!(!o.is_dirty());
        assert!(lines.set(1, json!("x")).unwrap());
        assert!(o.is_dirty());
        assert_eq!(o.to_json().unwrap()["lines"][1], "x");
    }
}
