//! Utility functions and helpers

pub mod logger;
mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::Timer;

use std::sync::Arc;

/// Pointer identity of two `Arc`s, ignoring trait-object metadata
pub fn same_arc<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
