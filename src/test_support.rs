#![cfg(test)]

// Shared unit-test fixtures
use crate::Document;
use crate::config::ContextConfig;
use crate::context::BucketContext;
use crate::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abv: f64,
}

impl Document for Beer {
    fn key_field() -> Option<&'static str> {
        Some("id")
    }
}

pub fn beer(id: &str) -> Beer {
    Beer { id: id.into(), name: "Pale".into(), abv: 5.0 }
}

/// Context over a fresh in-memory store with default config.
pub fn memory_context() -> (Arc<MemoryStore>, BucketContext) {
    let store = Arc::new(MemoryStore::new());
    let ctx = BucketContext::new(store.clone(), ContextConfig::default());
    (store, ctx)
}
