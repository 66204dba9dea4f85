//! Query-model to N1QL compiler with a change-tracking document layer.
//!
//! Queries are built as a [`n1ql::QueryModel`] (usually through [`n1ql::Query`]), compiled
//! by [`n1ql::compile`] and executed through a [`context::BucketContext`], which also owns
//! the change-tracking unit of work.

pub mod cli;
pub mod config;
pub mod context;
pub mod document;
pub mod errors;
pub mod n1ql;
pub mod serializer;
pub mod store;
pub mod tracking;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::ContextConfig;
pub use context::{BucketContext, Cursor};
pub use document::Document;
pub use errors::N1qlError;
pub use n1ql::{CompiledQuery, Expr, Query, QueryModel, compile};
pub use tracking::{TrackedDocument, TrackedList};

/// Configure logging from `N1QLITE_LOG_*` variables, falling back to `log4rs.yaml` in the
/// working directory when no log directory is set.
///
/// # Errors
/// Returns an error if the log directory can't be created or an appender fails to open.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("N1QLITE_LOG_DIR").is_some() {
        utils::logger::configure_from_env()
    } else {
        utils::logger::init()
    }
}
