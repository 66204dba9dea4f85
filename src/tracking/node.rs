//! Per-document change-tracking state.
//!
//! Nodes form a graph linking each document to its sub-documents and lists. Links are weak
//! both ways; a node lives as long as the document or list that owns it. Modifications mark
//! the node and every ancestor dirty, so a root's flag reflects its whole tree.
//! `clear_status` walks down and stops at nodes that are already clear, which is what ends
//! traversal on cyclic graphs.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives modification reports from root nodes.
pub trait ChangeSink: Send + Sync {
    fn modified(&self, key: &str);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Flags {
    dirty: bool,
    deserializing: bool,
    deleted: bool,
}

#[derive(Default)]
struct Owner {
    key: Option<String>,
    sink: Option<Weak<dyn ChangeSink>>,
}

#[derive(Default)]
pub struct TrackedNode {
    flags: Mutex<Flags>,
    owner: RwLock<Owner>,
    children: Mutex<Vec<Weak<TrackedNode>>>,
    parents: Mutex<Vec<Weak<TrackedNode>>>,
    #[cfg(test)]
    clear_calls: AtomicUsize,
}

impl std::fmt::Debug for TrackedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = *self.flags.lock();
        f.debug_struct("TrackedNode")
            .field("key", &self.key())
            .field("dirty", &flags.dirty)
            .field("deserializing", &flags.deserializing)
            .field("deleted", &flags.deleted)
            .field("children", &self.children.lock().len())
            .finish()
    }
}

fn addr(n: &TrackedNode) -> usize {
    std::ptr::from_ref(n) as usize
}

impl TrackedNode {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.flags.lock().dirty
    }

    #[must_use]
    pub fn is_deserializing(&self) -> bool {
        self.flags.lock().deserializing
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags.lock().deleted
    }

    /// Document key; only root nodes have one.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.owner.read().key.clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.owner.read().sink.as_ref().is_some_and(|s| s.strong_count() > 0)
    }

    /// Make this node the root of document `key`, reporting to `sink`.
    pub fn attach(&self, key: impl Into<String>, sink: Weak<dyn ChangeSink>) {
        let mut owner = self.owner.write();
        owner.key = Some(key.into());
        owner.sink = Some(sink);
    }

    pub fn set_key(&self, key: impl Into<String>) {
        self.owner.write().key = Some(key.into());
    }

    /// Stop reporting to the owning context. The key is kept.
    pub fn detach(&self) {
        self.owner.write().sink = None;
    }

    pub fn begin_deserializing(&self) {
        self.flags.lock().deserializing = true;
    }

    /// Record a mutation of this node. Ignored while deserializing; otherwise marks this
    /// node and its ancestors dirty and notifies every attached root above it.
    pub fn document_modified(&self) {
        {
            let mut f = self.flags.lock();
            if f.deserializing {
                return;
            }
            f.dirty = true;
        }
        self.propagate(false);
    }

    /// Flag the document for removal. Reported upward regardless of dirtiness.
    pub fn mark_deleted(&self) {
        self.flags.lock().deleted = true;
        self.propagate(true);
    }

    fn propagate(&self, deleting: bool) {
        let mut visited = HashSet::from([addr(self)]);
        self.report();
        let mut stack = self.parent_nodes();
        while let Some(node) = stack.pop() {
            if !visited.insert(addr(&node)) {
                continue;
            }
            {
                // a document still being materialized hears nothing from below
                let mut f = node.flags.lock();
                if f.deserializing {
                    continue;
                }
                if !deleting {
                    f.dirty = true;
                }
            }
            node.report();
            stack.extend(node.parent_nodes());
        }
    }

    fn report(&self) {
        let (key, sink) = {
            let owner = self.owner.read();
            (owner.key.clone(), owner.sink.as_ref().and_then(Weak::upgrade))
        };
        if let (Some(key), Some(sink)) = (key, sink) {
            sink.modified(&key);
        }
    }

    fn parent_nodes(&self) -> Vec<Arc<TrackedNode>> {
        let mut parents = self.parents.lock();
        parents.retain(|p| p.strong_count() > 0);
        parents.iter().filter_map(Weak::upgrade).collect()
    }

    /// Reset dirty and deserializing here and below. A node that is already clear
    /// returns immediately without visiting its children.
    pub fn clear_status(&self) {
        #[cfg(test)]
        self.clear_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut f = self.flags.lock();
            if !f.dirty && !f.deserializing {
                return;
            }
            f.dirty = false;
            f.deserializing = false;
        }
        for child in self.child_nodes() {
            child.clear_status();
        }
    }

    /// Dirty if this node or anything reachable below it is dirty.
    #[must_use]
    pub fn is_effectively_dirty(&self) -> bool {
        if self.is_dirty() {
            return true;
        }
        let mut visited = HashSet::from([addr(self)]);
        let mut pending = self.child_nodes();
        while let Some(node) = pending.pop() {
            if !visited.insert(addr(&node)) {
                continue;
            }
            if node.is_dirty() {
                return true;
            }
            pending.extend(node.child_nodes());
        }
        false
    }

    #[must_use]
    pub fn child_nodes(&self) -> Vec<Arc<TrackedNode>> {
        let mut children = self.children.lock();
        children.retain(|c| c.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    /// True if `candidate` is this node or is reachable from it through parent links.
    #[must_use]
    pub fn has_ancestor(&self, candidate: &TrackedNode) -> bool {
        let target = addr(candidate);
        if addr(self) == target {
            return true;
        }
        let mut visited = HashSet::from([addr(self)]);
        let mut stack = self.parent_nodes();
        while let Some(node) = stack.pop() {
            if addr(&node) == target {
                return true;
            }
            if visited.insert(addr(&node)) {
                stack.extend(node.parent_nodes());
            }
        }
        false
    }

    pub fn add_child(self: &Arc<Self>, child: &Arc<TrackedNode>) {
        {
            let mut children = self.children.lock();
            if children.iter().any(|c| std::ptr::eq(c.as_ptr(), Arc::as_ptr(child))) {
                return;
            }
            children.push(Arc::downgrade(child));
        }
        child.parents.lock().push(Arc::downgrade(self));
    }

    pub fn remove_child(self: &Arc<Self>, child: &Arc<TrackedNode>) {
        let removed = {
            let mut children = self.children.lock();
            let before = children.len();
            children.retain(|c| !std::ptr::eq(c.as_ptr(), Arc::as_ptr(child)));
            before != children.len()
        };
        if removed {
            let me = Arc::downgrade(self);
            child.parents.lock().retain(|p| !p.ptr_eq(&me));
        }
    }

    #[cfg(test)]
    pub(crate) fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ChangeSink for Recorder {
        fn modified(&self, key: &str) {
            self.0.lock().push(key.to_string());
        }
    }

    #[test]
    fn deserializing_suppresses_dirty() {
        let n = TrackedNode::new();
        n.begin_deserializing();
        n.document_modified();
        assert!(!n.is_dirty());
        n.clear_status();
        assert!(!n.is_deserializing());
        n.document_modified();
        assert!(n.is_dirty());
    }

    #[test]
    fn child_modification_marks_ancestors_and_reports_root() {
        let sink = Arc::new(Recorder::default());
        let weak: Weak<dyn ChangeSink> = Arc::downgrade(&(sink.clone() as Arc<dyn ChangeSink>));
        let root = TrackedNode::new();
        root.attach("beer_1", weak);
        let list = TrackedNode::new();
        let item = TrackedNode::new();
        root.add_child(&list);
        list.add_child(&item);

        item.document_modified();
        assert!(item.is_dirty() && list.is_dirty() && root.is_dirty());
        assert_eq!(sink.0.lock().as_slice(), ["beer_1".to_string()]);

        root.clear_status();
        assert!(!item.is_dirty() && !list.is_dirty() && !root.is_dirty());
    }

    #[test]
    fn clear_status_short_circuits_when_clear() {
        let root = TrackedNode::new();
        let child = TrackedNode::new();
        root.add_child(&child);
        child.document_modified();

        root.clear_status();
        assert_eq!(child.clear_calls(), 1);
        root.clear_status();
        assert!(!root.is_dirty() && !root.is_deserializing());
        assert_eq!(child.clear_calls(), 1);
    }

    #[test]
    fn cycles_terminate() {
        let a = TrackedNode::new();
        let b = TrackedNode::new();
        a.add_child(&b);
        b.add_child(&a);
        b.document_modified();
        assert!(a.is_dirty() && b.is_dirty());
        a.clear_status();
        assert!(!a.is_dirty() && !b.is_dirty());
        assert!(!a.is_effectively_dirty());
    }

    #[test]
    fn deserializing_ancestor_is_neither_dirtied_nor_reported() {
        let sink = Arc::new(Recorder::default());
        let weak: Weak<dyn ChangeSink> = Arc::downgrade(&(sink.clone() as Arc<dyn ChangeSink>));
        let root = TrackedNode::new();
        root.attach("k", weak);
        let child = TrackedNode::new();
        root.add_child(&child);
        root.begin_deserializing();
        child.document_modified();
        assert!(child.is_dirty());
        assert!(!root.is_dirty());
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn ancestry_follows_parent_links() {
        let root = TrackedNode::new();
        let mid = TrackedNode::new();
        let leaf = TrackedNode::new();
        root.add_child(&mid);
        mid.add_child(&leaf);
        assert!(leaf.has_ancestor(&root) && leaf.has_ancestor(&leaf));
        assert!(!root.has_ancestor(&leaf));
    }

    #[test]
    fn child_links_do_not_keep_nodes_alive() {
        let root = TrackedNode::new();
        let child = TrackedNode::new();
        root.add_child(&child);
        let weak = Arc::downgrade(&child);
        drop(child);
        assert!(weak.upgrade().is_none());
        assert!(root.child_nodes().is_empty());
    }

    #[test]
    fn removed_child_no_longer_propagates() {
        let root = TrackedNode::new();
        let child = TrackedNode::new();
        root.add_child(&child);
        root.remove_child(&child);
        child.document_modified();
        assert!(child.is_dirty());
        assert!(!root.is_dirty());
        assert!(root.child_nodes().is_empty());
    }

    #[test]
    fn mark_deleted_reports_without_dirtying() {
        let sink = Arc::new(Recorder::default());
        let weak: Weak<dyn ChangeSink> = Arc::downgrade(&(sink.clone() as Arc<dyn ChangeSink>));
        let root = TrackedNode::new();
        root.attach("k", weak);
        root.mark_deleted();
        assert!(root.is_deleted());
        assert!(!root.is_dirty());
        assert_eq!(sink.0.lock().len(), 1);
        root.detach();
        root.document_modified();
        assert_eq!(sink.0.lock().len(), 1);
    }
}
