//! Remote test execution
//!
//! Runs test classes in-process and streams their events to a server.

mod emitter;
mod runner;

pub use emitter::{EventEmitter, EventForwarder};
pub use runner::{process_properties, ClientError, RunReport, TestRunner};
