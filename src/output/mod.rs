//! Output formatting module
//!
//! Prints the events a server receives.

mod formatter;

pub use formatter::{ConsoleListener, EventFormatter, OutputFormat};
