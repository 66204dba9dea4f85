//! Change tracking: node state machine, document and list interception, and the registry
//! of tracked and modified documents.

mod list;
mod node;
mod proxy;
mod registry;

pub use list::TrackedList;
pub use node::{ChangeSink, TrackedNode};
pub use proxy::{Property, TrackedDocument};
pub use registry::ChangeRegistry;
