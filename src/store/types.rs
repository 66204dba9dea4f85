use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A failure reported by the store itself (transport, timeout, missing key...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Errors,
    Fatal,
}

/// One entry of the structured error list a query service may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDiagnostic {
    pub code: u32,
    #[serde(rename = "msg")]
    pub message: String,
}

/// Result of a string query: rows on success, optionally a structured error list otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<QueryDiagnostic>,
}

impl QueryResponse {
    #[must_use]
    pub const fn success(rows: Vec<Value>) -> Self {
        Self { status: QueryStatus::Success, rows, errors: Vec::new() }
    }

    #[must_use]
    pub const fn failed(errors: Vec<QueryDiagnostic>) -> Self {
        Self { status: QueryStatus::Errors, rows: Vec::new(), errors }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

/// Operations the core needs from the database. Everything else about the cluster
/// (connections, topology, auth) is hidden behind implementations of this trait.
pub trait DocumentStore: Send + Sync {
    /// # Errors
    /// Store-specific failure.
    fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// # Errors
    /// Store-specific failure; the document was not written.
    fn upsert(&self, id: &str, document: &Value) -> Result<(), StoreError>;

    /// # Errors
    /// Store-specific failure; the document was not removed.
    fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Run a query statement. A query the service rejected is `Ok` with a non-success
    /// status; `Err` means the store could not produce a response at all.
    ///
    /// # Errors
    /// Store-specific failure.
    fn query(&self, statement: &str) -> Result<QueryResponse, StoreError>;
}
