use super::types::{DocumentStore, QueryResponse, StoreError};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Upsert(String),
    Remove(String),
}

/// In-memory `DocumentStore`.
///
/// Key/value operations work against a map. Queries can't be evaluated, so responses are
/// scripted: an exact-statement response wins, otherwise queued responses are handed out
/// in order, otherwise an empty success is returned. Every statement and write is recorded.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Value>>,
    by_statement: RwLock<HashMap<String, Result<QueryResponse, StoreError>>>,
    queued: Mutex<VecDeque<Result<QueryResponse, StoreError>>>,
    statements: Mutex<Vec<String>>,
    writes: Mutex<Vec<WriteOp>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, doc: Value) {
        self.docs.write().insert(id.into(), doc);
    }

    #[must_use]
    pub fn document(&self, id: &str) -> Option<Value> {
        self.docs.read().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Respond to this exact statement with `response` every time it is run.
    pub fn respond_to(&self, statement: impl Into<String>, response: Result<QueryResponse, StoreError>) {
        self.by_statement.write().insert(statement.into(), response);
    }

    /// Queue a one-shot response for the next statement without an exact match.
    pub fn push_response(&self, response: Result<QueryResponse, StoreError>) {
        self.queued.lock().push_back(response);
    }

    pub fn push_rows(&self, rows: Vec<Value>) {
        self.push_response(Ok(QueryResponse::success(rows)));
    }

    /// Make upsert/remove of `id` fail.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.failing.write().insert(id.into());
    }

    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    #[must_use]
    pub fn writes(&self) -> Vec<WriteOp> {
        self.writes.lock().clone()
    }

    fn check_write(&self, id: &str) -> Result<(), StoreError> {
        if self.failing.read().contains(id) {
            return Err(StoreError::new(format!("temporary failure writing {id}")));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs.read().get(id).cloned())
    }

    fn upsert(&self, id: &str, document: &Value) -> Result<(), StoreError> {
        self.check_write(id)?;
        self.writes.lock().push(WriteOp::Upsert(id.to_string()));
        self.docs.write().insert(id.to_string(), document.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.check_write(id)?;
        self.writes.lock().push(WriteOp::Remove(id.to_string()));
        if self.docs.write().remove(id).is_none() {
            return Err(StoreError::new(format!("key not found: {id}")));
        }
        Ok(())
    }

    fn query(&self, statement: &str) -> Result<QueryResponse, StoreError> {
        self.statements.lock().push(statement.to_string());
        if let Some(r) = self.by_statement.read().get(statement) {
            return r.clone();
        }
        self.queued.lock().pop_front().unwrap_or_else(|| Ok(QueryResponse::success(Vec::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QueryDiagnostic;
    use serde_json::json;

    #[test]
    fn upsert_get_remove() {
        let s = MemoryStore::new();
        s.upsert("a", &json!({"x": 1})).unwrap();
        assert_eq!(s.get("a").unwrap(), Some(json!({"x": 1})));
        s.remove("a").unwrap();
        assert!(s.get("a").unwrap().is_none());
        assert!(s.remove("a").is_err());
        assert_eq!(s.writes(), vec![WriteOp::Upsert("a".into()), WriteOp::Remove("a".into()), WriteOp::Remove("a".into())]);
    }

    #[test]
    fn failing_writes_are_not_applied() {
        let s = MemoryStore::new();
        s.fail_writes_for("bad");
        assert!(s.upsert("bad", &json!({})).is_err());
        assert!(s.is_empty());
        assert!(s.writes().is_empty());
    }

    #[test]
    fn scripted_responses() {
        let s = MemoryStore::new();
        s.respond_to("SELECT 1", Ok(QueryResponse::success(vec![json!({"$1": 1})])));
        s.push_response(Ok(QueryResponse::failed(vec![QueryDiagnostic { code: 3000, message: "syntax".into() }])));
        assert_eq!(s.query("SELECT 1").unwrap().rows.len(), 1);
        assert!(!s.query("SELECT 2").unwrap().is_success());
        assert!(s.query("SELECT 3").unwrap().is_success());
        assert_eq!(s.statements(), vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }
}
