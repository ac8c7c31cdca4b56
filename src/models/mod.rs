//! Data models for remote test runs
//!
//! Events exchanged between runner and server, and the statistics they carry.

mod event;
mod summary;

pub use event::{ErrorInfo, Event, EventKind, EventType};
pub use summary::Summary;
