//! Bucket context: the unit-of-work owner tying store, serializer, query compilation and
//! change tracking together.

mod cursor;
mod exec;

pub use cursor::Cursor;

use crate::config::ContextConfig;
use crate::document::{Document, KeyResolver};
use crate::errors::N1qlError;
use crate::n1ql::QueryGenerationContext;
use crate::serializer::{JsonSerializer, Serializer, from_stored, to_stored};
use crate::store::DocumentStore;
use crate::tracking::{ChangeRegistry, TrackedDocument};
use crate::utils::logger::TRACKING_TARGET;
use std::sync::Arc;

pub struct BucketContext {
    store: Arc<dyn DocumentStore>,
    serializer: Arc<dyn Serializer>,
    config: ContextConfig,
    registry: Arc<ChangeRegistry>,
    keys: KeyResolver,
}

impl std::fmt::Debug for BucketContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketContext")
            .field("bucket", &self.config.bucket)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn write_failed(id: &str, e: impl std::fmt::Display) -> N1qlError {
    N1qlError::StoreWriteFailed { id: id.to_string(), reason: e.to_string() }
}

impl BucketContext {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: ContextConfig) -> Self {
        Self::with_serializer(store, Arc::new(JsonSerializer::new()), config)
    }

    #[must_use]
    pub fn with_serializer(
        store: Arc<dyn DocumentStore>,
        serializer: Arc<dyn Serializer>,
        config: ContextConfig,
    ) -> Self {
        let ctx = Self { store, serializer, registry: ChangeRegistry::new(), keys: KeyResolver::new(), config };
        if ctx.config.change_tracking {
            ctx.begin_change_tracking();
        }
        ctx
    }

    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.config.bucket
    }

    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ChangeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Fresh generation context for one query.
    #[must_use]
    pub fn generation_context(&self, select_document_metadata: bool) -> QueryGenerationContext {
        QueryGenerationContext::new(self.serializer.clone(), self.config.naming, self.config.bucket.clone())
            .with_document_metadata(select_document_metadata)
    }

    pub fn begin_change_tracking(&self) {
        self.registry.begin();
    }

    pub fn end_change_tracking(&self) {
        self.registry.end();
    }

    #[must_use]
    pub fn change_tracking_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    /// Read a document by key.
    ///
    /// # Errors
    /// Store failure or a document that doesn't deserialize as `T`.
    pub fn get<T: Document>(&self, key: &str) -> Result<Option<T>, N1qlError> {
        match self.store.get(key)? {
            Some(v) => Ok(Some(from_stored(self.serializer.as_ref(), v)?)),
            None => Ok(None),
        }
    }

    /// Read a document by key as a proxy. While tracking, an already tracked instance is
    /// returned as is and new ones are tracked.
    ///
    /// # Errors
    /// Store failure or a stored value that isn't an object.
    pub fn get_tracked(&self, key: &str) -> Result<Option<TrackedDocument>, N1qlError> {
        let tracking = self.registry.is_enabled();
        if tracking && let Some(d) = self.registry.tracked(key) {
            return Ok(Some(d));
        }
        let Some(v) = self.store.get(key)? else {
            return Ok(None);
        };
        let doc = TrackedDocument::from_json(self.serializer.from_document(v)?)?;
        doc.node().set_key(key);
        if tracking {
            self.registry.track(key, &doc);
        }
        Ok(Some(doc))
    }

    /// Write `doc`. Outside tracking it goes straight to the store; inside it is staged
    /// until `submit_changes`.
    ///
    /// # Errors
    /// `DocumentKeyMissing`, serde failure or `StoreWriteFailed`.
    pub fn save<T: Document>(&self, doc: &T) -> Result<(), N1qlError> {
        let value = serde_json::to_value(doc)?;
        let key = self.keys.key_of::<T>(&value)?;
        if self.registry.is_enabled() {
            let tracked = match self.registry.tracked(&key) {
                Some(existing) => {
                    existing.replace_with(value)?;
                    existing
                }
                None => {
                    let fresh = TrackedDocument::from_json(value)?;
                    self.registry.track(&key, &fresh);
                    fresh
                }
            };
            tracked.node().document_modified();
            self.registry.stage(&key, &tracked);
            log::debug!(target: TRACKING_TARGET, "staged save of {key}");
            return Ok(());
        }
        let stored = to_stored(self.serializer.as_ref(), doc)?;
        self.store.upsert(&key, &stored).map_err(|e| write_failed(&key, e))
    }

    /// Save a proxy under its key.
    ///
    /// # Errors
    /// `DocumentKeyMissing` if the proxy has no key, or the write fails.
    pub fn save_tracked(&self, doc: &TrackedDocument) -> Result<(), N1qlError> {
        let key = doc.key().ok_or_else(|| N1qlError::DocumentKeyMissing("untracked document".into()))?;
        if self.registry.is_enabled() {
            if !self.registry.is_tracked(&key) {
                self.registry.track(&key, doc);
            }
            doc.node().document_modified();
            self.registry.stage(&key, doc);
            return Ok(());
        }
        let stored = self.serializer.to_document(doc.to_json()?)?;
        self.store.upsert(&key, &stored).map_err(|e| write_failed(&key, e))?;
        doc.node().clear_status();
        Ok(())
    }

    /// Delete `doc`. Staged while tracking, immediate otherwise.
    ///
    /// # Errors
    /// `DocumentKeyMissing` or `StoreWriteFailed`.
    pub fn remove<T: Document>(&self, doc: &T) -> Result<(), N1qlError> {
        let value = serde_json::to_value(doc)?;
        let key = self.keys.key_of::<T>(&value)?;
        if self.registry.is_enabled() {
            let tracked = match self.registry.tracked(&key) {
                Some(d) => d,
                None => {
                    let d = TrackedDocument::from_json(value)?;
                    self.registry.track(&key, &d);
                    d
                }
            };
            tracked.node().mark_deleted();
            self.registry.stage(&key, &tracked);
            log::debug!(target: TRACKING_TARGET, "staged removal of {key}");
            return Ok(());
        }
        self.store.remove(&key).map_err(|e| write_failed(&key, e))
    }

    /// # Errors
    /// `DocumentKeyMissing` if the proxy has no key, or the removal fails.
    pub fn remove_tracked(&self, doc: &TrackedDocument) -> Result<(), N1qlError> {
        let key = doc.key().ok_or_else(|| N1qlError::DocumentKeyMissing("untracked document".into()))?;
        if self.registry.is_enabled() {
            if !self.registry.is_tracked(&key) {
                self.registry.track(&key, doc);
            }
            doc.node().mark_deleted();
            self.registry.stage(&key, doc);
            return Ok(());
        }
        self.store.remove(&key).map_err(|e| write_failed(&key, e))
    }

    /// Stop tracking the document with `key`. Unknown keys are ignored.
    pub fn untrack(&self, key: &str) {
        self.registry.untrack(key);
    }

    /// Write every staged change, one store call at a time, in key order.
    ///
    /// Does nothing unless tracking is enabled and every scope is closed. The first failed
    /// write stops the loop; tracking is disabled and the staged set cleared either way.
    ///
    /// # Errors
    /// The `StoreWriteFailed` (or serialization error) of the first failing document.
    pub fn submit_changes(&self) -> Result<(), N1qlError> {
        if !self.registry.can_submit() {
            log::debug!(
                target: TRACKING_TARGET,
                "submit ignored: enabled={} depth={}",
                self.registry.is_enabled(),
                self.registry.depth()
            );
            return Ok(());
        }
        let pending = self.registry.pending();
        log::info!(target: TRACKING_TARGET, "submitting {} change(s)", pending.len());
        let result = self.commit(&pending);
        self.registry.reset();
        if let Err(e) = &result {
            log::error!(target: TRACKING_TARGET, "submit aborted: {e}");
        }
        result
    }

    fn commit(&self, pending: &[(String, TrackedDocument)]) -> Result<(), N1qlError> {
        for (key, doc) in pending {
            if doc.is_deleted() {
                self.store.remove(key).map_err(|e| write_failed(key, e))?;
                crate::dev6!("{{\"op\":\"remove\",\"key\":\"{key}\"}}");
                self.registry.untrack(key);
            } else if doc.node().is_effectively_dirty() {
                let stored = self.serializer.to_document(doc.to_json()?)?;
                self.store.upsert(key, &stored).map_err(|e| write_failed(key, e))?;
                crate::dev6!("{{\"op\":\"upsert\",\"key\":\"{key}\"}}");
            }
            doc.node().clear_status();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WriteOp;
    use crate::test_support::{beer, memory_context as setup};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[test]
    fn save_writes_through_without_tracking() {
        let (store, ctx) = setup();
        ctx.save(&beer("b1")).unwrap();
        assert_eq!(store.document("b1").unwrap()["name"], "Pale");
        ctx.remove(&beer("b1")).unwrap();
        assert!(store.document("b1").is_none());
    }

    #[test]
    fn staged_until_submit() {
        let (store, ctx) = setup();
        ctx.begin_change_tracking();
        ctx.save(&beer("b1")).unwrap();
        assert!(store.writes().is_empty());
        ctx.end_change_tracking();
        ctx.submit_changes().unwrap();
        assert_eq!(store.writes(), vec![WriteOp::Upsert("b1".into())]);
        assert!(!ctx.change_tracking_enabled());
    }

    #[test]
    fn submit_inside_open_scope_is_ignored() {
        let (store, ctx) = setup();
        ctx.begin_change_tracking();
        ctx.save(&beer("b1")).unwrap();
        ctx.submit_changes().unwrap();
        assert!(store.writes().is_empty());
        assert_eq!(ctx.registry().modified_count(), 1);
    }

    #[test]
    fn failed_write_aborts_and_resets() {
        let (store, ctx) = setup();
        store.fail_writes_for("b2");
        ctx.begin_change_tracking();
        for id in ["b1", "b2", "b3"] {
            ctx.save(&beer(id)).unwrap();
        }
        ctx.end_change_tracking();
        let err = ctx.submit_changes().unwrap_err();
        assert!(matches!(err, N1qlError::StoreWriteFailed { ref id, .. } if id == "b2"));
        assert_eq!(store.writes(), vec![WriteOp::Upsert("b1".into())]);
        assert_eq!(ctx.registry().modified_count(), 0);
        assert!(!ctx.change_tracking_enabled());
    }

    #[test]
    fn tracked_get_returns_same_instance() {
        let (store, ctx) = setup();
        store.insert("b1", json!({"id": "b1", "name": "Pale"}));
        ctx.begin_change_tracking();
        let a = ctx.get_tracked("b1").unwrap().unwrap();
        let b = ctx.get_tracked("b1").unwrap().unwrap();
        assert!(a.ptr_eq(&b));
        a.set_value("name", json!("Stout"));
        assert!(ctx.registry().is_modified("b1"));
        ctx.untrack("b1");
        assert!(!ctx.registry().is_modified("b1"));
        assert!(ctx.get_tracked("missing").unwrap().is_none());
    }

    #[test]
    fn missing_key_field_is_reported() {
        #[derive(Serialize, Deserialize)]
        struct NoKey {
            x: i32,
        }
        impl Document for NoKey {}
        let (_, ctx) = setup();
        assert!(matches!(ctx.save(&NoKey { x: 1 }), Err(N1qlError::DocumentKeyMissing(_))));
        assert!(matches!(ctx.save_tracked(&TrackedDocument::new()), Err(N1qlError::DocumentKeyMissing(_))));
    }
}
