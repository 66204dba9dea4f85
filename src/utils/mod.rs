//! Utility modules: logger setup and developer traces.
pub mod devlog;
pub mod logger;
