//! Tracked document decorator.
//!
//! A `TrackedDocument` holds the properties of one stored document (or sub-document) and
//! routes every assignment through change detection. Handles are cheap to clone and share
//! the same underlying document.
//!
//! A document owns the sub-documents and lists assigned to it, except when the assigned
//! container is already an ancestor of the document (or the document itself). Such a
//! back-reference is held weakly and reads as absent once the ancestor is dropped, so a
//! cyclic graph is freed with its last outside handle.

use super::list::{TrackedList, WeakList};
use super::node::TrackedNode;
use crate::errors::N1qlError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};

/// Value of one property. Objects become sub-documents and arrays become lists so that
/// mutations below the root stay observable.
#[derive(Debug, Clone)]
pub enum Property {
    Value(Value),
    Document(TrackedDocument),
    List(TrackedList),
}

impl Property {
    /// Build the tracked form of a JSON value. Nested containers are materialized clean.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Document(TrackedDocument::materialize(map)),
            Value::Array(items) => Self::List(TrackedList::materialize(items)),
            other => Self::Value(other),
        }
    }

    pub(crate) fn node(&self) -> Option<&Arc<TrackedNode>> {
        match self {
            Self::Value(_) => None,
            Self::Document(d) => Some(d.node()),
            Self::List(l) => Some(l.node()),
        }
    }

    /// Scalars compare by value, containers by identity.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => same_value(a, b),
            (Self::Document(a), Self::Document(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub(crate) fn to_json_guarded(&self, path: &mut HashSet<usize>) -> Result<Value, N1qlError> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Document(d) => d.to_json_guarded(path),
            Self::List(l) => l.to_json_guarded(path),
        }
    }

    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

// `5` and `5.0` are the same number.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Storage form of a property or list element.
#[derive(Clone)]
pub(crate) enum Slot {
    Owned(Property),
    Document(Weak<DocumentInner>),
    List(WeakList),
}

impl Slot {
    /// Store `p` under `holder`, weakly if it is one of the holder's ancestors.
    pub(crate) fn hold(holder: &TrackedNode, p: Property) -> Self {
        match p {
            Property::Document(d) if holder.has_ancestor(d.node()) => Self::Document(Arc::downgrade(&d.inner)),
            Property::List(l) if holder.has_ancestor(l.node()) => Self::List(l.downgrade()),
            p => Self::Owned(p),
        }
    }

    /// `None` once a weakly held container is gone.
    pub(crate) fn get(&self) -> Option<Property> {
        match self {
            Self::Owned(p) => Some(p.clone()),
            Self::Document(w) => w.upgrade().map(|inner| Property::Document(TrackedDocument { inner })),
            Self::List(w) => w.upgrade().map(Property::List),
        }
    }

    pub(crate) fn get_or_null(&self) -> Property {
        self.get().unwrap_or(Property::Value(Value::Null))
    }
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        Self::from_json(v)
    }
}

impl From<TrackedDocument> for Property {
    fn from(d: TrackedDocument) -> Self {
        Self::Document(d)
    }
}

impl From<TrackedList> for Property {
    fn from(l: TrackedList) -> Self {
        Self::List(l)
    }
}

/// Attach `new`'s node and detach `old`'s node under `owner`.
pub(crate) fn relink(owner: &Arc<TrackedNode>, old: Option<&Property>, new: Option<&Property>) {
    if let Some(n) = old.and_then(Property::node) {
        owner.remove_child(n);
    }
    if let Some(n) = new.and_then(Property::node) {
        owner.add_child(n);
    }
}

pub(crate) struct DocumentInner {
    node: Arc<TrackedNode>,
    props: RwLock<BTreeMap<String, Slot>>,
}

#[derive(Clone)]
pub struct TrackedDocument {
    inner: Arc<DocumentInner>,
}

// Graphs may be cyclic, so only the top level is printed.
impl std::fmt::Debug for TrackedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedDocument")
            .field("node", &self.inner.node)
            .field("properties", &self.property_names())
            .finish()
    }
}

impl Default for TrackedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedDocument {
    /// Fresh, empty and clean document.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(DocumentInner { node: TrackedNode::new(), props: RwLock::new(BTreeMap::new()) }) }
    }

    /// Materialize a stored JSON object. Property writes happen while the node is
    /// deserializing, so the result starts clean.
    ///
    /// # Errors
    /// `UnexpectedResult` if `value` is not an object.
    pub fn from_json(value: Value) -> Result<Self, N1qlError> {
        match value {
            Value::Object(map) => Ok(Self::materialize(map)),
            other => Err(N1qlError::UnexpectedResult(format!("expected a JSON object, got {other}"))),
        }
    }

    pub(crate) fn materialize(map: Map<String, Value>) -> Self {
        let doc = Self::new();
        doc.node().begin_deserializing();
        for (name, value) in map {
            doc.set(name, Property::from_json(value));
        }
        doc.node().clear_status();
        doc
    }

    /// Build from any serializable value.
    ///
    /// # Errors
    /// Serde failure, or the value doesn't serialize to an object.
    pub fn from_typed<T: serde::Serialize>(value: &T) -> Result<Self, N1qlError> {
        Self::from_json(serde_json::to_value(value)?)
    }

    #[must_use]
    pub fn node(&self) -> &Arc<TrackedNode> {
        &self.inner.node
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.inner.node.key()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.node.is_dirty()
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.inner.node.is_deleted()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Property> {
        self.inner.props.read().get(name).and_then(Slot::get)
    }

    /// Plain JSON of a property, containers included.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.get(name).and_then(|p| p.to_json_guarded(&mut HashSet::new()).ok())
    }

    #[must_use]
    pub fn get_document(&self, name: &str) -> Option<Self> {
        match self.get(name) {
            Some(Property::Document(d)) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_list(&self, name: &str) -> Option<TrackedList> {
        match self.get(name) {
            Some(Property::List(l)) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.inner.props.read().iter().filter(|(_, s)| s.get().is_some()).map(|(k, _)| k.clone()).collect()
    }

    /// Assign a property. Returns true if the assignment changed the document.
    ///
    /// Missing and null are the same value. On change the old container is unlinked, the
    /// new one linked, and the node reports the modification.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Property>) -> bool {
        let name = name.into();
        let value = value.into();
        let slot = Slot::hold(&self.inner.node, value.clone());
        let old = {
            let mut props = self.inner.props.write();
            let unchanged = match props.get(&name).and_then(Slot::get) {
                Some(old) => old.same_as(&value),
                None => matches!(&value, Property::Value(Value::Null)),
            };
            if unchanged {
                return false;
            }
            props.insert(name, slot).and_then(|s| s.get())
        };
        relink(&self.inner.node, old.as_ref(), Some(&value));
        self.inner.node.document_modified();
        true
    }

    /// Shorthand for `set` with a JSON value.
    pub fn set_value(&self, name: impl Into<String>, value: Value) -> bool {
        self.set(name, Property::from_json(value))
    }

    /// Remove a property. Removing an absent or null property is not a change.
    pub fn remove(&self, name: &str) -> bool {
        let Some(old) = self.inner.props.write().remove(name).and_then(|s| s.get()) else {
            return false;
        };
        relink(&self.inner.node, Some(&old), None);
        if matches!(old, Property::Value(Value::Null)) {
            return false;
        }
        self.inner.node.document_modified();
        true
    }

    /// Make the content equal to `value`: properties it lacks are removed, the rest are
    /// assigned. Returns true if anything changed.
    ///
    /// # Errors
    /// `UnexpectedResult` if `value` is not an object.
    pub fn replace_with(&self, value: Value) -> Result<bool, N1qlError> {
        let Value::Object(map) = value else {
            return Err(N1qlError::UnexpectedResult(format!("expected a JSON object, got {value}")));
        };
        let mut changed = false;
        for name in self.property_names() {
            if !map.contains_key(&name) {
                changed |= self.remove(&name);
            }
        }
        for (name, v) in map {
            changed |= self.set_value(name, v);
        }
        Ok(changed)
    }

    /// Current content as JSON.
    ///
    /// # Errors
    /// `UnexpectedResult` when a sub-document contains itself.
    pub fn to_json(&self) -> Result<Value, N1qlError> {
        self.to_json_guarded(&mut HashSet::new())
    }

    pub(crate) fn to_json_guarded(&self, path: &mut HashSet<usize>) -> Result<Value, N1qlError> {
        let id = Arc::as_ptr(&self.inner) as usize;
        if !path.insert(id) {
            return Err(N1qlError::UnexpectedResult("cyclic document graph".into()));
        }
        let props: Vec<(String, Property)> =
            self.inner.props.read().iter().filter_map(|(k, s)| Some((k.clone(), s.get()?))).collect();
        let mut out = Map::with_capacity(props.len());
        for (k, v) in props {
            out.insert(k, v.to_json_guarded(path)?);
        }
        path.remove(&id);
        Ok(Value::Object(out))
    }

    /// Deserialize the current content.
    ///
    /// # Errors
    /// Serde failure or a cyclic graph.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, N1qlError> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }
}
