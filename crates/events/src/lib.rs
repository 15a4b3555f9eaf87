//! In-process change notification for studydesk.
//!
//! - [`ListenerRegistry`] -- synchronous observer registry with
//!   `register -> token` / `unregister(token)` semantics, independent of any
//!   UI framework.

pub mod registry;

pub use registry::{Listener, ListenerRegistry, ListenerToken};
