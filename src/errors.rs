use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum N1qlError {
    #[error("Translation not supported: {0}")]
    CompilationUnsupported(String),

    #[error("Invalid identifier: {0}")]
    IdentifierInvalid(String),

    #[error("Store write failed for {id}: {reason}")]
    StoreWriteFailed { id: String, reason: String },

    #[error("Query failed: {0}")]
    StoreQueryFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No key field found for document type {0}")]
    DocumentKeyMissing(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for N1qlError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl N1qlError {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::CompilationUnsupported(what.into())
    }
}
