//! The narrow document-store contract the core depends on, plus an in-memory store.
mod memory;
mod types;

pub use memory::{MemoryStore, WriteOp};
pub use types::{DocumentStore, QueryDiagnostic, QueryResponse, QueryStatus, StoreError};
