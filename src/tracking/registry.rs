//! Tracked and modified document sets plus the tracking-scope reference count.

use super::node::ChangeSink;
use super::proxy::TrackedDocument;
use crate::utils::logger::TRACKING_TARGET;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Lock order is `tracked` then `modified`. A key enters `modified` only while `tracked`
/// is held, so an untracked key can never be staged by a late report.
pub struct ChangeRegistry {
    me: Weak<ChangeRegistry>,
    tracked: RwLock<HashMap<String, TrackedDocument>>,
    modified: RwLock<HashMap<String, TrackedDocument>>,
    scope: Mutex<Scope>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Scope {
    depth: usize,
    enabled: bool,
}

impl std::fmt::Debug for ChangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = *self.scope.lock();
        f.debug_struct("ChangeRegistry")
            .field("depth", &scope.depth)
            .field("enabled", &scope.enabled)
            .field("tracked", &self.tracked.read().len())
            .field("modified", &self.modified.read().len())
            .finish()
    }
}

impl ChangeRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            tracked: RwLock::new(HashMap::new()),
            modified: RwLock::new(HashMap::new()),
            scope: Mutex::new(Scope::default()),
        })
    }

    /// Open a tracking scope. Scopes nest; tracking is enabled from the first one.
    pub fn begin(&self) {
        let mut s = self.scope.lock();
        s.depth += 1;
        s.enabled = true;
        log::debug!(target: TRACKING_TARGET, "begin change tracking depth={}", s.depth);
    }

    /// Close a scope. Closing the outermost one untracks every document; tracking stays
    /// enabled so pending changes can still be submitted.
    pub fn end(&self) {
        let depth = {
            let mut s = self.scope.lock();
            s.depth = s.depth.saturating_sub(1);
            s.depth
        };
        log::debug!(target: TRACKING_TARGET, "end change tracking depth={depth}");
        if depth == 0 {
            let mut tracked = self.tracked.write();
            for doc in tracked.values() {
                doc.node().detach();
            }
            tracked.clear();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.scope.lock().enabled
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope.lock().depth
    }

    /// Submission is effective only with tracking enabled and every scope closed.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        let s = self.scope.lock();
        s.enabled && s.depth == 0
    }

    /// Associate `doc` with `key` and route its modifications here.
    pub fn track(&self, key: &str, doc: &TrackedDocument) {
        let sink: Weak<dyn ChangeSink> = self.me.clone();
        doc.node().attach(key, sink);
        self.tracked.write().insert(key.to_string(), doc.clone());
    }

    /// Forget `key`. Absent keys are ignored.
    pub fn untrack(&self, key: &str) {
        let doc = {
            let mut tracked = self.tracked.write();
            let doc = tracked.remove(key);
            self.modified.write().remove(key);
            doc
        };
        if let Some(d) = doc {
            d.node().detach();
        }
    }

    /// Stage `doc` for the next submit.
    pub fn stage(&self, key: &str, doc: &TrackedDocument) {
        let _tracked = self.tracked.read();
        self.modified.write().insert(key.to_string(), doc.clone());
    }

    #[must_use]
    pub fn tracked(&self, key: &str) -> Option<TrackedDocument> {
        self.tracked.read().get(key).cloned()
    }

    #[must_use]
    pub fn is_tracked(&self, key: &str) -> bool {
        self.tracked.read().contains_key(key)
    }

    #[must_use]
    pub fn is_modified(&self, key: &str) -> bool {
        self.modified.read().contains_key(key)
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.read().len()
    }

    #[must_use]
    pub fn modified_count(&self) -> usize {
        self.modified.read().len()
    }

    /// Staged documents ordered by key.
    #[must_use]
    pub fn pending(&self) -> Vec<(String, TrackedDocument)> {
        let mut out: Vec<(String, TrackedDocument)> =
            self.modified.read().iter().map(|(k, d)| (k.clone(), d.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Disable tracking and drop everything staged.
    pub fn reset(&self) {
        self.scope.lock().enabled = false;
        self.modified.write().clear();
    }
}

impl ChangeSink for ChangeRegistry {
    fn modified(&self, key: &str) {
        let tracked = self.tracked.read();
        if let Some(d) = tracked.get(key) {
            self.modified.write().insert(key.to_string(), d.clone());
        }
    }
}
