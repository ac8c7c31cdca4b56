//! Run and suite statistics
//!
//! A `Summary` is the frozen result of one scope (a suite or a whole run).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate counts and elapsed time for one suite or one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Tests started
    pub run_count: u64,
    /// Tests that ended without a failure or an error
    pub success_count: u64,
    /// Assertion failures
    pub failure_count: u64,
    /// Unexpected errors
    pub error_count: u64,
    /// Wall-clock time of the scope in milliseconds
    pub elapsed_time: u64,
}

impl Summary {
    /// Sum two summaries, counts and elapsed time alike
    pub fn merge(&self, other: &Summary) -> Summary {
        Summary {
            run_count: self.run_count + other.run_count,
            success_count: self.success_count + other.success_count,
            failure_count: self.failure_count + other.failure_count,
            error_count: self.error_count + other.error_count,
            elapsed_time: self.elapsed_time + other.elapsed_time,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.failure_count == 0 && self.error_count == 0
    }

    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.run_count as f64) * 100.0
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tests run: {}, Successes: {}, Failures: {}, Errors: {}, Time elapsed: {}ms",
            self.run_count,
            self.success_count,
            self.failure_count,
            self.error_count,
            self.elapsed_time
        )
    }
}
