//! Remote test execution
//!
//! A runner executes test classes in its own process and streams lifecycle
//! events (run, suite and test start, end, failure, error) over TCP to an
//! aggregating server, which dispatches them to its listeners and can ask the
//! runner to stop.

pub mod cli;
pub mod config;
pub mod demo;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod models;
pub mod output;
pub mod server;
pub mod transport;
pub mod utils;
